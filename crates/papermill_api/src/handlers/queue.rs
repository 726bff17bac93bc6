//! Handlers for queue visibility: task listing and per-status counts.
//!
//! Both are available to any authenticated principal; listing is scoped
//! to the caller's own tasks unless they hold the admin role.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use papermill_db::models::task::{Task, TaskListQuery};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Response for GET /queue/tasks.
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub total: i64,
}

/// GET /api/v1/queue/tasks
///
/// Paginated task listing, newest first. Supports `status`, `limit`
/// (default 50, max 500), and `offset` query parameters.
pub async fn list_tasks(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let (tasks, total) = state.queue.list_for(&auth.principal, &params).await?;
    Ok(Json(TaskListResponse { tasks, total }))
}

/// GET /api/v1/queue/stats
///
/// Per-status task counts across the whole queue.
pub async fn get_queue_stats(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}
