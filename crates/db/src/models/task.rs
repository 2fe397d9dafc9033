//! Task queue models.

use rotor_core::error::CoreError;
use rotor_core::tasks::TaskKind;
use rotor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{StatusId, TaskStatus};

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: DbId,
    pub kind_id: i16,
    pub status_id: StatusId,
    pub system_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub created_at: Timestamp,
    pub leased_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Task {
    /// Decoded task kind.
    pub fn kind(&self) -> Result<TaskKind, CoreError> {
        TaskKind::try_from(self.kind_id)
    }

    /// Decoded status. Unknown IDs read as `None`.
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_id(self.status_id)
    }
}

/// Query parameters for `GET /api/v1/automation/tasks`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    /// Filter by kind (`renewal`, `single_generation`, `batch_generation`).
    pub kind: Option<TaskKind>,
    /// Filter by status ID (1 = pending, 2 = leased, ...).
    pub status: Option<StatusId>,
    /// Filter by system.
    pub system_id: Option<DbId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
