//! Periodic detection of systems whose credentials need renewing.
//!
//! Each tick releases elapsed failure cooldowns, resets systems stuck in
//! flight without a live task, then queues a renewal for every idle system
//! inside the advance window. The advance window is read from
//! `automation_config` on every tick so operator changes apply immediately.

use std::time::Duration;

use chrono::Utc;
use rotor_db::repositories::{AutomationConfigRepo, SystemRepo};
use rotor_events::PlatformEvent;
use tokio_util::sync::CancellationToken;

use crate::engine::renewal::queue_renewal;
use crate::state::AppState;

/// Counts from one detector pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetectorSummary {
    pub released: usize,
    pub healed: usize,
    pub due: usize,
    pub queued: usize,
}

/// Run one detector pass.
pub async fn tick(state: &AppState) -> Result<DetectorSummary, sqlx::Error> {
    let pool = &state.pool;
    let now = Utc::now();

    let config = AutomationConfigRepo::get(pool).await?;
    let policy = state.config.policy.with_advance_minutes(config.advance_minutes);

    let released = SystemRepo::release_cooldowns(pool, policy.failure_cooldown_cutoff(now)).await?;
    if !released.is_empty() {
        tracing::info!(count = released.len(), "Failure cooldowns released");
    }

    let healed = SystemRepo::reset_orphaned(pool).await?;
    for &system_id in &healed {
        tracing::error!(system_id, "System was in flight without a live renewal task, reset to idle");
        state
            .event_bus
            .publish(PlatformEvent::system_self_healed(system_id));
    }

    let due = SystemRepo::list_due(pool, policy.due_cutoff(now), policy.cooldown_cutoff(now)).await?;

    let mut queued = 0;
    for system in &due {
        match queue_renewal(pool, system, false).await {
            Ok(Some(task)) => {
                queued += 1;
                tracing::info!(
                    system_id = system.id,
                    external_id = system.external_id,
                    task_id = task.id,
                    expires_at = %system.expires_at,
                    "Renewal queued",
                );
                state
                    .event_bus
                    .publish(PlatformEvent::renewal_queued(system.id, task.id, false));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(system_id = system.id, error = %e, "Failed to queue renewal");
            }
        }
    }

    let summary = DetectorSummary {
        released: released.len(),
        healed: healed.len(),
        due: due.len(),
        queued,
    };
    tracing::debug!(?summary, "Renewal detector tick");
    Ok(summary)
}

/// Run the detector loop until `cancel` is triggered.
pub async fn run(state: AppState, cancel: CancellationToken) {
    let period = Duration::from_secs(state.config.detector_tick_secs);
    tracing::info!(interval_secs = period.as_secs(), "Renewal detector started");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Renewal detector stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = tick(&state).await {
                    tracing::error!(error = %e, "Renewal detector tick failed");
                }
            }
        }
    }
}
