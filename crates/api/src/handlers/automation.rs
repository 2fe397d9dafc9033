//! Handlers for the `/automation` resource: the worker pull protocol and
//! the operator controls around it.
//!
//! All endpoints require the automation key via [`AutomationKey`].

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rotor_core::automation::validate_update;
use rotor_core::tasks::TaskKind;
use rotor_core::types::DbId;
use rotor_db::models::automation::{LogListQuery, UpdateAutomationConfig};
use rotor_db::models::distribution::DistributionRequest;
use rotor_db::models::status::TaskStatus;
use rotor_db::models::task::{Task, TaskListQuery};
use rotor_db::repositories::{AutomationConfigRepo, AutomationLogRepo, SystemRepo, TaskRepo};
use rotor_events::PlatformEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::engine::completion::{self, TaskReport};
use crate::engine::{distribution, generation};
use crate::error::{AppError, AppResult};
use crate::middleware::automation_key::AutomationKey;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Worker protocol
// ---------------------------------------------------------------------------

/// Response of `GET /automation/next-task`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextTaskResponse {
    pub enabled: bool,
    pub has_task: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<LeasedTask>,
}

/// A task handed to the worker.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeasedTask {
    pub id: DbId,
    pub kind: TaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_ref: Option<DbId>,
    pub payload: serde_json::Value,
}

/// GET /api/v1/automation/next-task
///
/// Lease at most one task. While automation is disabled only renewal tasks
/// are handed out. Renewal payloads carry the system's current credentials.
pub async fn next_task(
    _key: AutomationKey,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let config = AutomationConfigRepo::get(&state.pool).await?;
    let kinds = TaskKind::leasable(config.enabled);

    let Some(task) = TaskRepo::lease(&state.pool, kinds, Utc::now()).await? else {
        return Ok(Json(NextTaskResponse {
            enabled: config.enabled,
            has_task: false,
            task: None,
        }));
    };

    let kind = task.kind()?;
    tracing::info!(
        task_id = task.id,
        %kind,
        system_id = ?task.system_id,
        attempts = task.attempts,
        "Task leased",
    );

    let payload = worker_payload(&state, &task, kind).await?;

    Ok(Json(NextTaskResponse {
        enabled: config.enabled,
        has_task: true,
        task: Some(LeasedTask {
            id: task.id,
            kind,
            system_ref: task.system_id,
            payload,
        }),
    }))
}

/// Build the payload sent to the worker for a leased task.
async fn worker_payload(state: &AppState, task: &Task, kind: TaskKind) -> AppResult<serde_json::Value> {
    let mut payload = task.payload.clone();
    if kind != TaskKind::Renewal {
        return Ok(payload);
    }

    let Some(system_id) = task.system_id else {
        return Ok(payload);
    };
    if let Some(system) = SystemRepo::find_by_id(&state.pool, system_id).await? {
        if let Some(fields) = payload.as_object_mut() {
            fields.insert("externalId".into(), json!(system.external_id));
            fields.insert("username".into(), json!(system.username));
            fields.insert("secret".into(), json!(system.secret));
            fields.insert("expiresAt".into(), json!(system.expires_at));
        }
    }
    Ok(payload)
}

/// Response of `POST /automation/task-complete`.
#[derive(Debug, Serialize)]
pub struct TaskCompleteResponse {
    pub accepted: bool,
}

/// POST /api/v1/automation/task-complete
///
/// Record a worker report. Duplicate reports for finished tasks are
/// accepted without effect. Malformed success reports return
/// `accepted: false`.
pub async fn task_complete(
    _key: AutomationKey,
    State(state): State<AppState>,
    Json(report): Json<TaskReport>,
) -> AppResult<impl IntoResponse> {
    let outcome = completion::apply_report(&state, report).await?;
    Ok(Json(TaskCompleteResponse {
        accepted: outcome.accepted(),
    }))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// GET /api/v1/automation/config
pub async fn get_config(
    _key: AutomationKey,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let config = AutomationConfigRepo::get(&state.pool).await?;
    Ok(Json(config))
}

/// PUT /api/v1/automation/config
///
/// Partial update. Omitted fields keep their current value.
pub async fn update_config(
    _key: AutomationKey,
    State(state): State<AppState>,
    Json(input): Json<UpdateAutomationConfig>,
) -> AppResult<impl IntoResponse> {
    validate_update(input.batch_size, input.interval_minutes, input.advance_minutes)?;

    let config = AutomationConfigRepo::update(&state.pool, &input).await?;

    tracing::info!(
        enabled = config.enabled,
        batch_size = config.batch_size,
        interval_minutes = config.interval_minutes,
        advance_minutes = config.advance_minutes,
        "Automation config updated",
    );
    state.event_bus.publish(PlatformEvent::config_updated(json!({
        "enabled": config.enabled,
        "batchSize": config.batch_size,
        "intervalMinutes": config.interval_minutes,
        "advanceMinutes": config.advance_minutes,
    })));

    Ok(Json(config))
}

// ---------------------------------------------------------------------------
// Distribution and generation
// ---------------------------------------------------------------------------

/// POST /api/v1/automation/distribute
pub async fn distribute(
    _key: AutomationKey,
    State(state): State<AppState>,
    Json(request): Json<DistributionRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = distribution::distribute(&state, &request).await?;
    Ok(Json(outcome))
}

/// Body of `POST /automation/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub quantity: i32,
}

/// Response of `POST /automation/generate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<DbId>,
    pub queued: bool,
}

/// POST /api/v1/automation/generate
///
/// Queue generation of `quantity` systems. Returns 201 with the task, or
/// 200 with `queued: false` when a batch is already live.
pub async fn generate(
    _key: AutomationKey,
    State(state): State<AppState>,
    Json(input): Json<GenerateRequest>,
) -> AppResult<impl IntoResponse> {
    let task = generation::queue_generation(&state, input.quantity, false).await?;

    let status = if task.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(GenerateResponse {
            task_id: task.as_ref().map(|t| t.id),
            queued: task.is_some(),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// GET /api/v1/automation/tasks
///
/// Supports optional `kind`, `status`, `systemId`, `limit` and `offset`.
pub async fn list_tasks(
    _key: AutomationKey,
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    if let Some(status) = params.status {
        if TaskStatus::from_id(status).is_none() {
            return Err(AppError::BadRequest(format!("Unknown task status id {status}")));
        }
    }
    let tasks = TaskRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/automation/logs
///
/// Newest first. Supports optional `systemId`, `eventType`, `limit` and
/// `offset`.
pub async fn list_logs(
    _key: AutomationKey,
    State(state): State<AppState>,
    Query(params): Query<LogListQuery>,
) -> AppResult<impl IntoResponse> {
    let entries = AutomationLogRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: entries }))
}
