//! Mirror of system records in the external directory.
//!
//! The directory is a secondary copy of each system's credentials and bound
//! points. Mirroring is best effort: failures are logged and counted, and
//! the `mirror_pending` flag on the system row keeps the change queued for
//! the reconciler.

pub mod client;
pub mod http;
pub mod record;
pub mod sync;

pub use client::{DirectoryClient, DirectoryError, NoopDirectoryClient};
pub use http::HttpDirectoryClient;
pub use record::DirectoryRecord;
pub use sync::{DirectorySynchronizer, ReconcileSummary, SyncStats};
