//! Automation settings and log models.

use rotor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The `automation_config` singleton row.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationConfig {
    pub enabled: bool,
    pub batch_size: i32,
    pub interval_minutes: i32,
    pub advance_minutes: i32,
    pub last_generation_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// DTO for `PUT /api/v1/automation/config`. All fields are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAutomationConfig {
    pub enabled: Option<bool>,
    pub batch_size: Option<i32>,
    pub interval_minutes: Option<i32>,
    pub advance_minutes: Option<i32>,
}

/// A row from the append-only `automation_log` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: DbId,
    pub event_type: String,
    pub system_id: Option<DbId>,
    pub task_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

/// Values for appending a log entry.
#[derive(Debug, Clone)]
pub struct CreateLogEntry {
    pub event_type: String,
    pub system_id: Option<DbId>,
    pub task_id: Option<DbId>,
    pub payload: serde_json::Value,
}

/// Query parameters for `GET /api/v1/automation/logs`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogListQuery {
    pub system_id: Option<DbId>,
    pub event_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
