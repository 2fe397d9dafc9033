use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rotor_api::background;
use rotor_api::config::{LogFormat, ServerConfig};
use rotor_api::router::build_app_router;
use rotor_api::state::AppState;
use rotor_directory::{DirectoryClient, DirectorySynchronizer, HttpDirectoryClient, NoopDirectoryClient};
use rotor_events::{EventBus, EventPersistence, WebhookNotifier};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));

    // --- Tracing ---
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rotor_api=debug,rotor_directory=info,rotor_events=info,tower_http=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!(
        host = %config.host,
        port = %config.port,
        directory = config.directory_url.as_deref().unwrap_or("disabled"),
        "Loaded server configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = rotor_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    rotor_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    rotor_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Directory ---
    let client: Arc<dyn DirectoryClient> = match &config.directory_url {
        Some(url) => Arc::new(
            HttpDirectoryClient::new(url, config.directory_token.clone())
                .expect("Failed to build directory client"),
        ),
        None => Arc::new(NoopDirectoryClient),
    };
    let directory = Arc::new(DirectorySynchronizer::new(client));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    let persistence_handle = tokio::spawn(EventPersistence::run(pool.clone(), event_bus.subscribe()));

    let notifier_handle = config.notify_webhook_url.as_deref().map(|url| {
        let notifier = WebhookNotifier::new(url).expect("Failed to build webhook notifier");
        tokio::spawn(notifier.run(event_bus.subscribe()))
    });

    tracing::info!(webhook = notifier_handle.is_some(), "Event services started");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        event_bus: Arc::clone(&event_bus),
        directory,
    };

    // --- Background loops ---
    let cancel = CancellationToken::new();
    let background_handles = background::spawn_all(&state, &cancel);
    tracing::info!(count = background_handles.len(), "Background loops started");

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    for handle in background_handles {
        if tokio::time::timeout(shutdown_timeout, handle).await.is_err() {
            tracing::warn!("Background loop did not stop in time");
        }
    }
    tracing::info!("Background loops stopped");

    // Dropping the last sender closes the channel and stops the subscribers.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    if let Some(handle) = notifier_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    tracing::info!("Event services shut down");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
