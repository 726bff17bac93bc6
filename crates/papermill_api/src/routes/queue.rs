//! Route definitions for queue visibility.

use axum::routing::get;
use axum::Router;

use crate::handlers::queue;
use crate::state::AppState;

/// Routes mounted at `/queue`.
///
/// ```text
/// GET /tasks -> list_tasks
/// GET /stats -> get_queue_stats
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(queue::list_tasks))
        .route("/stats", get(queue::get_queue_stats))
}
