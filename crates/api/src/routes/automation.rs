//! Route definitions for the `/automation` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::automation;
use crate::state::AppState;

/// Routes mounted at `/automation`.
///
/// ```text
/// GET    /next-task       -> next_task
/// POST   /task-complete   -> task_complete
/// GET    /config          -> get_config
/// PUT    /config          -> update_config
/// POST   /distribute      -> distribute
/// POST   /generate        -> generate
/// GET    /tasks           -> list_tasks
/// GET    /logs            -> list_logs
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/next-task", get(automation::next_task))
        .route("/task-complete", post(automation::task_complete))
        .route(
            "/config",
            get(automation::get_config).put(automation::update_config),
        )
        .route("/distribute", post(automation::distribute))
        .route("/generate", post(automation::generate))
        .route("/tasks", get(automation::list_tasks))
        .route("/logs", get(automation::list_logs))
}
