//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` across the server. Every
//! automation state change is published as a [`PlatformEvent`].

use chrono::{DateTime, Utc};
use rotor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::automation_event::AutomationEvent;

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// An automation state change as published on the bus.
///
/// The flat fields mirror one `automation_log` row. Events built from an
/// [`AutomationEvent`] also carry it in [`PlatformEvent::kind`] so
/// subscribers can match on the variant instead of the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name from `rotor_core::event_types`.
    pub event_type: String,

    /// System the event concerns, if any.
    pub system_id: Option<DbId>,

    /// Task the event concerns, if any.
    pub task_id: Option<DbId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,

    /// The typed event, absent for ad-hoc events built with [`PlatformEvent::new`].
    #[serde(skip)]
    pub kind: Option<AutomationEvent>,
}

impl PlatformEvent {
    /// Create an untyped event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            system_id: None,
            task_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
            kind: None,
        }
    }

    // -- typed constructors -------------------------------------------------

    /// A system received fresh credentials.
    pub fn system_renewed(system_id: DbId, task_id: DbId, expires_at: Timestamp) -> Self {
        AutomationEvent::SystemRenewed {
            system_id,
            task_id,
            expires_at,
        }
        .into()
    }

    /// A generation task produced new systems.
    pub fn systems_generated(task_id: DbId, system_ids: &[DbId]) -> Self {
        AutomationEvent::SystemsGenerated {
            task_id,
            system_ids: system_ids.to_vec(),
        }
        .into()
    }

    /// Points were redistributed.
    pub fn points_redistributed(mode: &str, systems_created: usize, points_bound: usize) -> Self {
        AutomationEvent::PointsRedistributed {
            mode: mode.to_string(),
            systems_created,
            points_bound,
        }
        .into()
    }

    /// A renewal task was queued.
    pub fn renewal_queued(system_id: DbId, task_id: DbId, forced: bool) -> Self {
        AutomationEvent::RenewalQueued {
            system_id,
            task_id,
            forced,
        }
        .into()
    }

    /// A renewal attempt failed.
    pub fn renewal_failed(system_id: Option<DbId>, task_id: DbId, reason: &str, malformed: bool) -> Self {
        AutomationEvent::RenewalFailed {
            system_id,
            task_id,
            reason: reason.to_string(),
            malformed,
        }
        .into()
    }

    /// An operator cancelled a system's in-flight renewal.
    pub fn renewal_cancelled(system_id: DbId, task_ids: &[DbId]) -> Self {
        AutomationEvent::RenewalCancelled {
            system_id,
            task_ids: task_ids.to_vec(),
        }
        .into()
    }

    /// A generation task was queued.
    pub fn generation_queued(task_id: DbId, quantity: i32, automatic: bool) -> Self {
        AutomationEvent::GenerationQueued {
            task_id,
            quantity,
            automatic,
        }
        .into()
    }

    /// A generation attempt failed.
    pub fn generation_failed(task_id: DbId, reason: &str, malformed: bool) -> Self {
        AutomationEvent::GenerationFailed {
            task_id,
            reason: reason.to_string(),
            malformed,
        }
        .into()
    }

    /// Abandoned leases were returned to the queue.
    pub fn tasks_reaped(task_ids: &[DbId]) -> Self {
        AutomationEvent::TasksReaped {
            task_ids: task_ids.to_vec(),
        }
        .into()
    }

    /// A system stuck in flight without a live task was reset.
    pub fn system_self_healed(system_id: DbId) -> Self {
        AutomationEvent::SystemSelfHealed { system_id }.into()
    }

    /// Automation settings changed.
    pub fn config_updated(settings: serde_json::Value) -> Self {
        AutomationEvent::ConfigUpdated { settings }.into()
    }
}

impl From<AutomationEvent> for PlatformEvent {
    fn from(event: AutomationEvent) -> Self {
        Self {
            event_type: event.event_type().to_string(),
            system_id: event.system_id(),
            task_id: event.task_id(),
            payload: event.payload(),
            timestamp: Utc::now(),
            kind: Some(event),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use rotor_events::bus::{EventBus, PlatformEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PlatformEvent::system_self_healed(7));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unread events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: PlatformEvent) {
        // A send error only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rotor_core::event_types;

    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let expires = Utc::now();
        bus.publish(PlatformEvent::system_renewed(3, 11, expires));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, event_types::SYSTEM_RENEWED);
        assert_eq!(received.system_id, Some(3));
        assert_eq!(received.task_id, Some(11));
        assert!(received.payload.get("expiresAt").is_some());
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlatformEvent::tasks_reaped(&[1, 2]));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.event_type, event_types::TASKS_REAPED);
        assert_eq!(e2.payload["count"], 2);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(PlatformEvent::new("orphan.event"));
    }

    #[test]
    fn bare_event_has_empty_optional_fields() {
        let event = PlatformEvent::new("bare.event");
        assert!(event.system_id.is_none());
        assert!(event.task_id.is_none());
        assert!(event.payload.is_object());
        assert!(event.kind.is_none());
    }

    #[tokio::test]
    async fn subscribers_match_on_the_typed_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(PlatformEvent::renewal_queued(5, 8, true));

        let received = rx.recv().await.expect("should receive the event");
        assert_matches!(
            received.kind,
            Some(AutomationEvent::RenewalQueued {
                system_id: 5,
                task_id: 8,
                forced: true,
            })
        );
    }

    #[test]
    fn renewal_failed_keeps_missing_system() {
        let event = PlatformEvent::renewal_failed(None, 9, "captcha", false);
        assert_eq!(event.event_type, event_types::RENEWAL_FAILED);
        assert!(event.system_id.is_none());
        assert_eq!(event.payload["reason"], "captcha");
        assert_eq!(event.payload["malformed"], false);
    }

    #[test]
    fn redistribution_payload_uses_camel_case() {
        let event = PlatformEvent::points_redistributed("fixed-capacity", 2, 9);
        assert_eq!(event.payload["systemsCreated"], 2);
        assert_eq!(event.payload["pointsBound"], 9);
        assert_eq!(event.payload["mode"], "fixed-capacity");
    }
}
