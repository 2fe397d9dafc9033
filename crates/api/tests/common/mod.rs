#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rotor_api::config::{LogFormat, ServerConfig};
use rotor_api::middleware::automation_key::AUTOMATION_KEY_HEADER;
use rotor_api::router::build_app_router;
use rotor_api::state::AppState;
use rotor_core::credentials::Credentials;
use rotor_core::hashing::sha256_hex;
use rotor_core::renewal::RenewalPolicy;
use rotor_directory::{
    DirectoryClient, DirectoryError, DirectoryRecord, DirectorySynchronizer, NoopDirectoryClient,
};
use rotor_db::models::system::{NewSystem, System};
use rotor_db::repositories::SystemRepo;
use rotor_events::EventBus;
use sqlx::PgPool;
use tower::ServiceExt;

/// Shared secret accepted by the test app.
pub const TEST_KEY: &str = "test-automation-key";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        automation_key_digest: sha256_hex(TEST_KEY.as_bytes()),
        policy: RenewalPolicy::default(),
        detector_tick_secs: 60,
        reaper_tick_secs: 60,
        generation_tick_secs: 60,
        max_points_per_system: 50,
        directory_url: None,
        directory_token: None,
        directory_sync_interval_secs: 120,
        notify_webhook_url: None,
        log_format: LogFormat::Pretty,
    }
}

/// App state backed by `pool` with the directory disabled.
pub fn test_state(pool: PgPool) -> AppState {
    test_state_with_directory(pool, Arc::new(NoopDirectoryClient))
}

/// App state backed by `pool` mirroring into `client`.
pub fn test_state_with_directory(pool: PgPool, client: Arc<dyn DirectoryClient>) -> AppState {
    AppState {
        pool,
        config: Arc::new(test_config()),
        event_bus: Arc::new(EventBus::default()),
        directory: Arc::new(DirectorySynchronizer::new(client)),
    }
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app(pool: PgPool) -> Router {
    build_app_router(test_state(pool), &test_config())
}

/// Build the router over an existing state.
pub fn app_for(state: &AppState) -> Router {
    build_app_router(state.clone(), &test_config())
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Send a request carrying the automation key.
pub async fn send(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTOMATION_KEY_HEADER, TEST_KEY);

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Insert a system expiring `expires_in_minutes` from now.
pub async fn seed_system(pool: &PgPool, external_id: i32, expires_in_minutes: i64) -> System {
    SystemRepo::insert(
        pool,
        &NewSystem {
            external_id,
            credentials: Credentials {
                username: format!("user-{external_id}"),
                secret: format!("secret-{external_id}"),
            },
            expires_at: Utc::now() + Duration::minutes(expires_in_minutes),
            capacity: 1,
        },
    )
    .await
    .unwrap()
}

pub async fn load_system(pool: &PgPool, id: i64) -> System {
    SystemRepo::find_by_id(pool, id).await.unwrap().unwrap()
}

/// Directory that records pushed records and can be told to fail.
#[derive(Default)]
pub struct RecordingDirectory {
    pub pushed: Mutex<Vec<DirectoryRecord>>,
    pub fail: bool,
}

#[async_trait]
impl DirectoryClient for RecordingDirectory {
    async fn update_system(&self, record: &DirectoryRecord) -> Result<(), DirectoryError> {
        if self.fail {
            return Err(DirectoryError::Api {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.pushed.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn create_system(&self, record: &DirectoryRecord) -> Result<(), DirectoryError> {
        self.update_system(record).await
    }
}
