//! Periodic push of systems whose directory mirror is out of date.

use std::time::Duration;

use rotor_directory::ReconcileSummary;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Most systems pushed per pass.
const RECONCILE_BATCH: i64 = 100;

/// Run one reconcile pass.
pub async fn tick(state: &AppState) -> Result<ReconcileSummary, sqlx::Error> {
    let summary = state.directory.reconcile(&state.pool, RECONCILE_BATCH).await?;
    if summary.pending > 0 {
        tracing::info!(
            pending = summary.pending,
            mirrored = summary.mirrored,
            "Directory reconcile pass",
        );
    }
    Ok(summary)
}

/// Run the reconciler loop until `cancel` is triggered.
pub async fn run(state: AppState, cancel: CancellationToken) {
    let period = Duration::from_secs(state.config.directory_sync_interval_secs);
    tracing::info!(interval_secs = period.as_secs(), "Directory reconciler started");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Directory reconciler stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = tick(&state).await {
                    tracing::error!(error = %e, "Directory reconcile failed");
                }
            }
        }
    }
}
