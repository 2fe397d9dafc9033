use std::sync::Arc;

use rotor_directory::DirectorySynchronizer;
use rotor_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is a pool handle.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: rotor_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Event bus for automation state changes.
    pub event_bus: Arc<EventBus>,
    /// Best-effort mirror into the external directory.
    pub directory: Arc<DirectorySynchronizer>,
}
