use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use papermill_api::background::queue_maintenance::{self, MaintenanceConfig};
use papermill_api::config::ServerConfig;
use papermill_api::router::build_app_router;
use papermill_api::state::AppState;
use papermill_db::queue::QueueService;

/// Exit codes: 0 success, 1 config error, 2 store unreachable, 3 port conflict.
const EXIT_CONFIG: i32 = 1;
const EXIT_STORE: i32 = 2;
const EXIT_PORT: i32 = 3;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "papermill_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(EXIT_CONFIG);
        }
    };
    tracing::info!(host = %config.host, port = config.api_port, "Loaded server configuration");

    for dir in [&config.upload_root, &config.output_root] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!(dir = %dir.display(), error = %e, "Cannot create data directory");
            std::process::exit(EXIT_CONFIG);
        }
    }
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(dir = %parent.display(), error = %e, "Cannot create database directory");
            std::process::exit(EXIT_CONFIG);
        }
    }

    // --- Database ---
    let pool = match papermill_db::create_pool(&config.db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, db_path = %config.db_path, "Failed to open task store");
            std::process::exit(EXIT_STORE);
        }
    };
    if let Err(e) = papermill_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(EXIT_STORE);
    }
    if let Err(e) = papermill_db::health_check(&pool).await {
        tracing::error!(error = %e, "Database health check failed");
        std::process::exit(EXIT_STORE);
    }
    tracing::info!("Task store ready");

    // --- Queue service ---
    let queue = QueueService::new(
        pool.clone(),
        config.upload_root.clone(),
        config.output_root.clone(),
    );

    // --- Maintenance loop ---
    let maintenance_cancel = tokio_util::sync::CancellationToken::new();
    let maintenance_handle = tokio::spawn(queue_maintenance::run(
        queue.clone(),
        MaintenanceConfig::from_server_config(&config),
        maintenance_cancel.clone(),
    ));

    // --- App state & router ---
    let state = AppState {
        pool,
        queue,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host = match config.host.parse() {
        Ok(host) => host,
        Err(e) => {
            tracing::error!(host = %config.host, error = %e, "Invalid HOST address");
            std::process::exit(EXIT_CONFIG);
        }
    };
    let addr = SocketAddr::new(host, config.api_port);
    tracing::info!(%addr, "Starting server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            tracing::error!(%addr, "Port already in use");
            std::process::exit(EXIT_PORT);
        }
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind to address");
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    maintenance_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), maintenance_handle).await;
    tracing::info!("Queue maintenance stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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
