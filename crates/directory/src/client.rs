//! The directory client seam.

use async_trait::async_trait;

use crate::record::DirectoryRecord;

/// Errors from a directory call.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The directory has no record for this external ID.
    #[error("Directory has no record for external id {0}")]
    NotFound(i32),

    /// The directory returned a non-2xx status code.
    #[error("Directory API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Writes system records to the external directory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Overwrite an existing record. Returns [`DirectoryError::NotFound`]
    /// when the directory does not know the external ID.
    async fn update_system(&self, record: &DirectoryRecord) -> Result<(), DirectoryError>;

    /// Create a new record.
    async fn create_system(&self, record: &DirectoryRecord) -> Result<(), DirectoryError>;
}

/// Client used when no directory is configured. Every call succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDirectoryClient;

#[async_trait]
impl DirectoryClient for NoopDirectoryClient {
    async fn update_system(&self, record: &DirectoryRecord) -> Result<(), DirectoryError> {
        tracing::trace!(external_id = record.external_id, "Directory disabled, skipping update");
        Ok(())
    }

    async fn create_system(&self, record: &DirectoryRecord) -> Result<(), DirectoryError> {
        tracing::trace!(external_id = record.external_id, "Directory disabled, skipping create");
        Ok(())
    }
}
