//! Operator webhook notifications with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs one JSON-encoded [`PlatformEvent`] to a URL,
//! retrying up to three times (1 s, 2 s, 4 s). [`WebhookNotifier`]
//! subscribes to the bus and forwards the events an operator should see.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::bus::PlatformEvent;

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);


// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers events to an external webhook endpoint.
pub struct WebhookDelivery {
    client: reqwest::Client,
}

impl WebhookDelivery {
    /// Create a delivery service with a timeout-bounded HTTP client.
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// JSON body sent for an event.
    pub fn body(event: &PlatformEvent) -> serde_json::Value {
        serde_json::json!({
            "eventType": event.event_type,
            "systemId": event.system_id,
            "taskId": event.task_id,
            "payload": event.payload,
            "timestamp": event.timestamp,
        })
    }

    /// Deliver an event with retry. Returns `Ok(())` on the first success.
    pub async fn deliver(&self, url: &str, event: &PlatformEvent) -> Result<(), WebhookError> {
        let payload = Self::body(event);

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(url, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(url, &payload).await.inspect_err(|e| {
            tracing::error!(url, error = %e, "Webhook delivery failed after all retries");
        })
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, url: &str, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// Forwards operator-relevant events from the bus to a webhook URL.
pub struct WebhookNotifier {
    delivery: Arc<WebhookDelivery>,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, WebhookError> {
        Ok(Self {
            delivery: Arc::new(WebhookDelivery::new()?),
            url: url.into(),
        })
    }

    /// Whether an event is forwarded. Untyped events never are.
    pub fn should_notify(event: &PlatformEvent) -> bool {
        event
            .kind
            .as_ref()
            .is_some_and(|kind| kind.notifies_operator())
    }

    /// Run the forwarding loop until the bus is dropped.
    ///
    /// Each delivery runs on its own task so retry backoff never stalls the
    /// receiver.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) if Self::should_notify(&event) => {
                    let delivery = Arc::clone(&self.delivery);
                    let url = self.url.clone();
                    tokio::spawn(async move {
                        let _ = delivery.deliver(&url, &event).await;
                    });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Webhook notifier lagged, events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, webhook notifier shutting down");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
