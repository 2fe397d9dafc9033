pub mod automation;
pub mod health;
pub mod systems;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /automation                   worker protocol, settings, listings
/// /systems                      system registry
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/automation", automation::router())
        .nest("/systems", systems::router())
}
