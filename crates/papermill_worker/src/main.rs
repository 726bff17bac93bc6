use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use papermill_db::queue::QueueService;
use papermill_worker::config::WorkerConfig;
use papermill_worker::engine::registry::EngineRegistry;
use papermill_worker::health;
use papermill_worker::worker::Worker;

/// Exit codes: 0 success, 1 config error, 2 store unreachable, 3 port conflict.
const EXIT_CONFIG: i32 = 1;
const EXIT_STORE: i32 = 2;
const EXIT_PORT: i32 = 3;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "papermill_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(EXIT_CONFIG);
        }
    };
    tracing::info!(
        devices = ?config.devices,
        workers_per_device = config.workers_per_device,
        "Loaded worker configuration",
    );

    // Migrations are idempotent, so workers may start before the API.
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
    tracing::info!("Task store ready");

    let queue = QueueService::new(
        pool,
        config.upload_root.clone(),
        config.output_root.clone(),
    );

    // One worker task per device slot, each with its own device-bound
    // engine registry. Oversubscription is prevented here: the number of
    // slots per device is the only GPU arbitration the core does.
    let cancel = tokio_util::sync::CancellationToken::new();
    let pid = std::process::id();
    let mut handles = Vec::new();
    let mut worker_ids = Vec::new();

    for device in &config.devices {
        let registry = Arc::new(EngineRegistry::from_env(*device));
        for slot in 0..config.workers_per_device {
            let worker_id = format!("{}-{device}-{pid}-{slot}", config.worker_prefix);
            worker_ids.push(worker_id.clone());
            let worker = Worker::new(
                queue.clone(),
                Arc::clone(&registry),
                worker_id,
                config.allowed_backends.clone(),
                config.poll_interval,
            );
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { worker.run(cancel).await }));
        }
    }

    tracing::info!(slots = handles.len(), "Worker pool running");

    // Health endpoint for schedulers and load balancers.
    if config.worker_port != 0 {
        let health_queue = queue.clone();
        let health_cancel = cancel.clone();
        let port = config.worker_port;
        tokio::spawn(async move {
            if let Err(e) = health::serve(health_queue, worker_ids, port, health_cancel).await {
                if e.kind() == std::io::ErrorKind::AddrInUse {
                    tracing::error!(port, "Worker health port already in use");
                    std::process::exit(EXIT_PORT);
                }
                tracing::error!(error = %e, "Worker health endpoint failed");
            }
        });
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received; letting workers finish their current task");
    cancel.cancel();

    for handle in handles {
        let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
    }

    tracing::info!("Worker pool stopped");
}

/// Wait for SIGINT or SIGTERM.
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
            tracing::info!("Received SIGINT (Ctrl-C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
