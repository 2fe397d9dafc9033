//! Periodic reclaim of abandoned task leases.
//!
//! A leased task whose worker never reported within the lease timeout goes
//! back to `pending` so the next poll picks it up again.

use std::time::Duration;

use chrono::Utc;
use rotor_core::types::DbId;
use rotor_db::repositories::TaskRepo;
use rotor_events::PlatformEvent;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Run one reaper pass. Returns the IDs of reclaimed tasks.
pub async fn tick(state: &AppState) -> Result<Vec<DbId>, sqlx::Error> {
    let cutoff = state.config.policy.lease_cutoff(Utc::now());
    let reaped = TaskRepo::reap_abandoned(&state.pool, cutoff).await?;

    let ids: Vec<DbId> = reaped.iter().map(|t| t.id).collect();
    if !ids.is_empty() {
        tracing::warn!(count = ids.len(), task_ids = ?ids, "Abandoned leases returned to queue");
        state.event_bus.publish(PlatformEvent::tasks_reaped(&ids));
    }
    Ok(ids)
}

/// Run the reaper loop until `cancel` is triggered.
pub async fn run(state: AppState, cancel: CancellationToken) {
    let period = Duration::from_secs(state.config.reaper_tick_secs);
    tracing::info!(
        interval_secs = period.as_secs(),
        lease_timeout_secs = state.config.policy.lease_timeout.num_seconds(),
        "Lease reaper started",
    );

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lease reaper stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = tick(&state).await {
                    tracing::error!(error = %e, "Lease reaper tick failed");
                }
            }
        }
    }
}
