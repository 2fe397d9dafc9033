//! Automatic batch generation.
//!
//! While automation is enabled with a non-zero interval, one generation
//! task of `batch_size` systems is queued per interval. The interval slot
//! is claimed in the database so restarts and multiple instances do not
//! double the rate.

use std::time::Duration;

use chrono::Utc;
use rotor_db::models::task::Task;
use rotor_db::repositories::AutomationConfigRepo;
use tokio_util::sync::CancellationToken;

use crate::engine::generation::queue_generation;
use crate::error::AppResult;
use crate::state::AppState;

/// Run one scheduler pass. Returns the queued task, if any.
pub async fn tick(state: &AppState) -> AppResult<Option<Task>> {
    let Some(batch_size) = AutomationConfigRepo::claim_generation_slot(&state.pool, Utc::now()).await?
    else {
        return Ok(None);
    };
    queue_generation(state, batch_size, true).await
}

/// Run the scheduler loop until `cancel` is triggered.
pub async fn run(state: AppState, cancel: CancellationToken) {
    let period = Duration::from_secs(state.config.generation_tick_secs);
    tracing::info!(interval_secs = period.as_secs(), "Generation scheduler started");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Generation scheduler stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = tick(&state).await {
                    tracing::error!(error = %e, "Generation scheduler tick failed");
                }
            }
        }
    }
}
