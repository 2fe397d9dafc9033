//! Best-effort directory synchronizer.
//!
//! Callers hand a system to [`DirectorySynchronizer`] after committing a
//! change. The synchronizer never returns an error: a failed push is logged
//! at warn, counted, and left for the reconciler through the row's
//! `mirror_pending` flag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rotor_core::types::DbId;
use rotor_db::models::system::System;
use rotor_db::repositories::{PointRepo, SystemRepo};
use rotor_db::DbPool;
use serde::Serialize;

use crate::client::{DirectoryClient, DirectoryError};
use crate::record::DirectoryRecord;

/// Point-in-time copy of the synchronizer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub attempts: u64,
    pub failures: u64,
    pub created: u64,
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub pending: usize,
    pub mirrored: usize,
}

#[derive(Default)]
struct Counters {
    attempts: AtomicU64,
    failures: AtomicU64,
    created: AtomicU64,
}

/// Pushes system records to the directory.
pub struct DirectorySynchronizer {
    client: Arc<dyn DirectoryClient>,
    counters: Counters,
}

impl DirectorySynchronizer {
    pub fn new(client: Arc<dyn DirectoryClient>) -> Self {
        Self {
            client,
            counters: Counters::default(),
        }
    }

    /// Current counter values.
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            created: self.counters.created.load(Ordering::Relaxed),
        }
    }

    /// Push one record: update, falling back to create when the directory
    /// does not know the external ID. Returns `true` on success.
    pub async fn push(&self, record: &DirectoryRecord) -> bool {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        let result = match self.client.update_system(record).await {
            Err(DirectoryError::NotFound(_)) => {
                let created = self.client.create_system(record).await;
                if created.is_ok() {
                    self.counters.created.fetch_add(1, Ordering::Relaxed);
                }
                created
            }
            other => other,
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    external_id = record.external_id,
                    error = %e,
                    "Directory mirror failed, will retry on reconcile",
                );
                false
            }
        }
    }

    /// Mirror a system row and clear its `mirror_pending` flag on success.
    ///
    /// The flag is only cleared if the row is unchanged since `system` was
    /// read, so a concurrent change is mirrored on a later pass.
    pub async fn mirror_system(&self, pool: &DbPool, system: &System) -> bool {
        let point_ids = match PointRepo::ids_for_system(pool, system.id).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(system_id = system.id, error = %e, "Failed to load bound points for mirror");
                return false;
            }
        };

        let record = DirectoryRecord::from_system(system, point_ids);
        if !self.push(&record).await {
            return false;
        }

        if let Err(e) = SystemRepo::clear_mirror_pending(pool, system.id, system.updated_at).await {
            tracing::warn!(system_id = system.id, error = %e, "Failed to clear mirror flag");
        }
        true
    }

    /// Mirror the given systems by ID. Returns how many succeeded.
    pub async fn mirror_ids(&self, pool: &DbPool, ids: &[DbId]) -> usize {
        let systems = match SystemRepo::find_by_ids(pool, ids).await {
            Ok(systems) => systems,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load systems for mirror");
                return 0;
            }
        };

        let mut mirrored = 0;
        for system in &systems {
            if self.mirror_system(pool, system).await {
                mirrored += 1;
            }
        }
        mirrored
    }

    /// Push up to `limit` systems still flagged `mirror_pending`.
    pub async fn reconcile(&self, pool: &DbPool, limit: i64) -> Result<ReconcileSummary, sqlx::Error> {
        let pending = SystemRepo::list_mirror_pending(pool, limit).await?;

        let mut summary = ReconcileSummary {
            pending: pending.len(),
            mirrored: 0,
        };
        for system in &pending {
            if self.mirror_system(pool, system).await {
                summary.mirrored += 1;
            }
        }
        Ok(summary)
    }
}
