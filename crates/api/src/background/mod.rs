//! Background tasks and scheduled jobs.
//!
//! Each submodule provides a long-running async `run` function intended to
//! be spawned via `tokio::spawn`, plus the single `tick` it repeats. All
//! tasks accept a [`CancellationToken`] for graceful shutdown.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

pub mod directory_reconciler;
pub mod generation_scheduler;
pub mod lease_reaper;
pub mod renewal_detector;

/// Spawn every background loop. They stop when `cancel` is triggered.
pub fn spawn_all(state: &AppState, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(renewal_detector::run(state.clone(), cancel.clone())),
        tokio::spawn(lease_reaper::run(state.clone(), cancel.clone())),
        tokio::spawn(generation_scheduler::run(state.clone(), cancel.clone())),
        tokio::spawn(directory_reconciler::run(state.clone(), cancel.clone())),
    ]
}
