//! Task entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use papermill_core::types::Timestamp;

use super::status::TaskStatus;

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub task_id: String,
    pub owner_user_id: String,
    pub file_name: String,
    pub file_path: String,
    pub backend: String,
    pub options: Json<serde_json::Value>,
    pub priority: i64,
    pub status: TaskStatus,
    pub worker_id: Option<String>,
    pub cancel_requested: bool,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub error_message: Option<String>,
    pub result_dir: Option<String>,
    pub markdown_file: Option<String>,
    pub json_file: Option<String>,
}

/// Input for creating a new task row.
///
/// The task id is generated by the caller so the upload can be persisted
/// under `uploads/<task_id>/` before the row exists.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_id: String,
    pub owner_user_id: String,
    pub file_name: String,
    pub file_path: String,
    pub backend: String,
    pub options: serde_json::Value,
    pub priority: i64,
    pub max_retries: i64,
}

/// Query parameters for task listing (`GET /queue/tasks`).
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// Filter by status string (e.g. `pending`, `failed`).
    pub status: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 500.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Resolved listing filter applied by the repository.
#[derive(Debug, Default)]
pub struct TaskFilter {
    /// When set, only tasks owned by this user are returned.
    pub owner_user_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Per-status counts for `GET /queue/stats`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub total: i64,
}

/// A terminal task eligible for retention cleanup.
#[derive(Debug, FromRow)]
pub struct PurgeCandidate {
    pub task_id: String,
    pub result_dir: Option<String>,
    pub file_path: String,
}
