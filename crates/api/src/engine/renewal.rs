//! Queueing and cancelling renewal work for a system.

use chrono::Utc;
use rotor_core::error::CoreError;
use rotor_core::tasks::TaskKind;
use rotor_core::types::DbId;
use rotor_db::models::system::System;
use rotor_db::models::task::Task;
use rotor_db::repositories::{SystemRepo, TaskRepo};
use rotor_db::DbPool;
use rotor_events::PlatformEvent;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Enqueue a renewal task for `system` and mark it `queued`.
///
/// Both writes share one transaction. Returns `None` when the system
/// already has a live renewal task.
pub async fn queue_renewal(
    pool: &DbPool,
    system: &System,
    forced: bool,
) -> Result<Option<Task>, sqlx::Error> {
    let payload = json!({ "externalId": system.external_id, "forced": forced });

    let mut tx = pool.begin().await?;
    let Some(task) = TaskRepo::enqueue(&mut *tx, TaskKind::Renewal, Some(system.id), &payload).await?
    else {
        return Ok(None);
    };

    if !SystemRepo::mark_queued(&mut *tx, system.id).await? {
        tracing::debug!(
            system_id = system.id,
            renewal_state = system.renewal_state_id,
            "Renewal queued for a system already in flight",
        );
    }
    tx.commit().await?;

    Ok(Some(task))
}

/// Result of an operator's forced renewal request.
#[derive(Debug)]
pub struct ForcedRenewal {
    pub task: Task,
    /// `false` when an existing live task was returned.
    pub created: bool,
}

/// Queue a renewal for a system regardless of its expiry.
pub async fn force_renew(state: &AppState, system_id: DbId) -> AppResult<ForcedRenewal> {
    let system = SystemRepo::find_by_id(&state.pool, system_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "System",
            id: system_id,
        }))?;

    if let Some(task) = queue_renewal(&state.pool, &system, true).await? {
        tracing::info!(system_id, task_id = task.id, "Forced renewal queued");
        state
            .event_bus
            .publish(PlatformEvent::renewal_queued(system_id, task.id, true));
        return Ok(ForcedRenewal {
            task,
            created: true,
        });
    }

    match TaskRepo::find_live_for_system(&state.pool, TaskKind::Renewal, system_id).await? {
        Some(task) => Ok(ForcedRenewal {
            task,
            created: false,
        }),
        // The live task finished between the enqueue and the lookup.
        None => Err(AppError::Core(CoreError::Conflict(format!(
            "Renewal for system {system_id} changed concurrently, retry"
        )))),
    }
}

/// Cancel every live task of a system and return it to `idle`.
pub async fn cancel_renewal(state: &AppState, system_id: DbId) -> AppResult<Vec<DbId>> {
    if SystemRepo::find_by_id(&state.pool, system_id).await?.is_none() {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "System",
            id: system_id,
        }));
    }

    let cancelled = TaskRepo::cancel_for_system(&state.pool, system_id, Utc::now()).await?;

    tracing::info!(system_id, cancelled = cancelled.len(), "Renewal cancelled by operator");
    state
        .event_bus
        .publish(PlatformEvent::renewal_cancelled(system_id, &cancelled));

    Ok(cancelled)
}
