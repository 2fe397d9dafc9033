//! Handlers for the `/systems` resource.
//!
//! All endpoints require the automation key via [`AutomationKey`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rotor_core::credentials::Credentials;
use rotor_core::error::CoreError;
use rotor_core::renewal::RenewalPolicy;
use rotor_core::types::DbId;
use rotor_db::models::system::{CreateSystem, NewSystem};
use rotor_db::repositories::SystemRepo;
use serde::Serialize;

use crate::engine::renewal;
use crate::error::{AppError, AppResult};
use crate::middleware::automation_key::AutomationKey;
use crate::response::DataResponse;
use crate::state::AppState;

/// Capacity of operator-created systems when none is given.
const DEFAULT_CAPACITY: i32 = 1;

/// GET /api/v1/systems
pub async fn list(
    _key: AutomationKey,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let systems = SystemRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: systems }))
}

/// GET /api/v1/systems/{id}
pub async fn get(
    _key: AutomationKey,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let system = SystemRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "System",
            id,
        }))?;
    Ok(Json(DataResponse { data: system }))
}

/// POST /api/v1/systems
///
/// Register a system. Without `externalId` the lowest free pool id is used.
/// With both `username` and `secret` the system starts with a full validity
/// window; with neither it gets placeholder credentials that are already
/// expired, so the detector renews it on its next tick.
pub async fn create(
    _key: AutomationKey,
    State(state): State<AppState>,
    Json(input): Json<CreateSystem>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();

    let capacity = input.capacity.unwrap_or(DEFAULT_CAPACITY);
    if capacity < 1 {
        return Err(AppError::Core(CoreError::Validation(
            "capacity must be at least 1".into(),
        )));
    }

    let mut tx = state.pool.begin().await?;

    let external_id = match input.external_id {
        Some(id) if id < 1 => {
            return Err(AppError::Core(CoreError::Validation(
                "externalId must be positive".into(),
            )))
        }
        Some(id) => {
            SystemRepo::lock_external_ids(&mut *tx).await?;
            id
        }
        None => SystemRepo::next_pool_external_id(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::Core(CoreError::Conflict("No free pool external id left".into()))
            })?,
    };

    let (credentials, expires_at) = match (input.username, input.secret) {
        (Some(username), Some(secret)) => {
            let credentials = Credentials { username, secret };
            if !credentials.is_complete() {
                return Err(AppError::Core(CoreError::Validation(
                    "username and secret must not be blank".into(),
                )));
            }
            (credentials, state.config.policy.created_expiry(now))
        }
        (None, None) => (
            Credentials::placeholder(external_id),
            RenewalPolicy::placeholder_expiry(now),
        ),
        _ => {
            return Err(AppError::Core(CoreError::Validation(
                "username and secret must be given together".into(),
            )))
        }
    };

    let system = SystemRepo::insert(
        &mut *tx,
        &NewSystem {
            external_id,
            credentials,
            expires_at,
            capacity,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        system_id = system.id,
        external_id = system.external_id,
        reserved = system.is_reserved(),
        "System created",
    );
    state.directory.mirror_system(&state.pool, &system).await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: system })))
}

/// DELETE /api/v1/systems/{id}
///
/// Cancels the system's live tasks and unbinds its points.
pub async fn delete(
    _key: AutomationKey,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !SystemRepo::delete(&state.pool, id, Utc::now()).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "System",
            id,
        }));
    }
    tracing::info!(system_id = id, "System deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Response of `POST /systems/{id}/renew`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewResponse {
    pub task_id: DbId,
}

/// POST /api/v1/systems/{id}/renew
///
/// Queue a renewal now. Returns 201 for a new task and 200 with the
/// existing task when one is already live.
pub async fn force_renew(
    _key: AutomationKey,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let renewal = renewal::force_renew(&state, id).await?;
    let status = if renewal.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(RenewResponse {
            task_id: renewal.task.id,
        }),
    ))
}

/// Response of `POST /systems/{id}/cancel-renewal`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRenewalResponse {
    pub cancelled_tasks: Vec<DbId>,
}

/// POST /api/v1/systems/{id}/cancel-renewal
pub async fn cancel_renewal(
    _key: AutomationKey,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancelled_tasks = renewal::cancel_renewal(&state, id).await?;
    Ok(Json(CancelRenewalResponse { cancelled_tasks }))
}
