//! REST client for the external directory.
//!
//! `PUT {base}/systems/{externalId}` updates a record and
//! `POST {base}/systems` creates one. An optional bearer token is sent with
//! every request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::client::{DirectoryClient, DirectoryError};
use crate::record::DirectoryRecord;

/// Timeout for a single directory request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for one directory deployment.
pub struct HttpDirectoryClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDirectoryClient {
    /// Create a client for `base_url`, e.g. `https://directory.internal/api`.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url, token))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// URL of the collection endpoint.
    pub fn systems_url(&self) -> String {
        format!("{}/systems", self.base_url)
    }

    /// URL of one record.
    pub fn system_url(&self, external_id: i32) -> String {
        format!("{}/systems/{external_id}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // ---- private helpers ----

    /// Map a non-2xx response to [`DirectoryError::Api`].
    async fn ensure_success(response: reqwest::Response) -> Result<(), DirectoryError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            return Err(DirectoryError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn update_system(&self, record: &DirectoryRecord) -> Result<(), DirectoryError> {
        let response = self
            .authorize(self.client.put(self.system_url(record.external_id)))
            .json(record)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(record.external_id));
        }
        Self::ensure_success(response).await
    }

    async fn create_system(&self, record: &DirectoryRecord) -> Result<(), DirectoryError> {
        let response = self
            .authorize(self.client.post(self.systems_url()))
            .json(record)
            .send()
            .await?;

        Self::ensure_success(response).await
    }
}
