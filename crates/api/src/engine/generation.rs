//! Queueing generation work.

use rotor_core::tasks::generation_kind;
use rotor_db::models::task::Task;
use rotor_db::repositories::TaskRepo;
use rotor_events::PlatformEvent;
use serde_json::json;

use crate::error::AppResult;
use crate::state::AppState;

/// Enqueue a generation task for `quantity` new systems.
///
/// One system becomes a `single_generation` task, more a
/// `batch_generation` task. Returns `None` when a live batch already exists.
pub async fn queue_generation(
    state: &AppState,
    quantity: i32,
    automatic: bool,
) -> AppResult<Option<Task>> {
    let kind = generation_kind(quantity)?;
    let payload = json!({ "quantity": quantity });

    let task = TaskRepo::enqueue(&state.pool, kind, None, &payload).await?;

    match &task {
        Some(task) => {
            tracing::info!(task_id = task.id, %kind, quantity, automatic, "Generation queued");
            state
                .event_bus
                .publish(PlatformEvent::generation_queued(task.id, quantity, automatic));
        }
        None => {
            tracing::debug!(%kind, quantity, "Generation already queued");
        }
    }

    Ok(task)
}
