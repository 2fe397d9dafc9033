//! Durable event persistence service.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and appends every received [`PlatformEvent`] to the `automation_log`
//! table, which doubles as the log sink read by collaborators.

use rotor_core::types::DbId;
use rotor_db::models::automation::CreateLogEntry;
use rotor_db::repositories::AutomationLogRepo;
use rotor_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::PlatformEvent;

/// Background service that persists automation events.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the bus is dropped.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to persist event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Append a single event to `automation_log`.
    pub async fn persist(pool: &DbPool, event: &PlatformEvent) -> Result<DbId, sqlx::Error> {
        AutomationLogRepo::insert(
            pool,
            &CreateLogEntry {
                event_type: event.event_type.clone(),
                system_id: event.system_id,
                task_id: event.task_id,
                payload: event.payload.clone(),
            },
        )
        .await
    }
}
