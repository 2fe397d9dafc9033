//! Route definitions for the `/systems` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::systems;
use crate::state::AppState;

/// Routes mounted at `/systems`.
///
/// ```text
/// GET    /                      -> list
/// POST   /                      -> create
/// GET    /{id}                  -> get
/// DELETE /{id}                  -> delete
/// POST   /{id}/renew            -> force_renew
/// POST   /{id}/cancel-renewal   -> cancel_renewal
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(systems::list).post(systems::create))
        .route("/{id}", get(systems::get).delete(systems::delete))
        .route("/{id}/renew", post(systems::force_renew))
        .route("/{id}/cancel-renewal", post(systems::cancel_renewal))
}
