//! Minimal health endpoint for the worker process.
//!
//! Schedulers and load balancers probe this instead of the task store;
//! the response embeds queue counts so an idle pool is distinguishable
//! from a stuck one.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use papermill_db::queue::QueueService;

#[derive(Clone)]
struct HealthState {
    queue: QueueService,
    worker_ids: Vec<String>,
}

/// GET /health -- worker pool liveness plus queue counts.
async fn health_check(
    State(state): State<HealthState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.queue.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "workers": state.worker_ids,
                "queue": stats,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": e.to_string(),
            })),
        ),
    }
}

fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
}

/// Serve the health endpoint until `cancel` is triggered.
///
/// Returns an error if the port cannot be bound, so the caller can exit
/// with the port-conflict code.
pub async fn serve(
    queue: QueueService,
    worker_ids: Vec<String>,
    port: u16,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let app = router(HealthState { queue, worker_ids });

    let listener =
        tokio::net::TcpListener::bind(std::net::SocketAddr::from(([0, 0, 0, 0], port))).await?;
    tracing::info!(port, "Worker health endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
