//! Handlers for the `/tasks` resource: submission, status with optional
//! inline artifact content, and cancellation.

use std::path::Path;

use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use papermill_db::models::status::TaskStatus;
use papermill_db::models::task::Task;
use papermill_db::queue::{CancelOutcome, SubmitTask};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireSubmitter;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Response for POST /tasks/submit.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub file_name: String,
}

/// Query parameters for GET /tasks/{id}.
#[derive(Debug, Deserialize)]
pub struct TaskDetailQuery {
    /// Inline artifact contents: `markdown`, `json`, or `both`.
    pub format: Option<String>,
    /// Accepted for compatibility; image upload is handled by an external
    /// object-storage sink.
    #[serde(default)]
    pub upload_images: bool,
}

/// Inline artifact payload attached to a completed task.
#[derive(Debug, Default, Serialize)]
pub struct TaskData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_file: Option<String>,
    pub json_available: bool,
}

/// Full task record with optional inline content.
#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<TaskData>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks/submit
///
/// Multipart submission: a `file` part plus form fields. `backend` and
/// `priority` are recognized; every other text field is passed through to
/// the engine verbatim in `options`. The upload is persisted under
/// `uploads/<task_id>/` before the task row is created, so a worker can
/// read it as soon as the claim lands.
pub async fn submit_task(
    RequireSubmitter(auth): RequireSubmitter,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let task_id = Uuid::new_v4().to_string();

    let mut backend = String::from("auto");
    let mut priority: Option<i64> = None;
    let mut max_retries: Option<i64> = None;
    let mut options = serde_json::Map::new();
    let mut upload: Option<(String, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(sanitize_file_name)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| AppError::BadRequest("Missing upload file name".into()))?;

                let data = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read upload: {e}"))
                })?;
                if data.is_empty() {
                    return Err(AppError::BadRequest("Uploaded file is empty".into()));
                }

                let dir = state.queue.task_upload_dir(&task_id);
                tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                    AppError::InternalError(format!("Failed to create upload dir: {e}"))
                })?;
                let path = dir.join(&file_name);
                tokio::fs::write(&path, &data).await.map_err(|e| {
                    AppError::InternalError(format!("Failed to persist upload: {e}"))
                })?;

                upload = Some((file_name, path.to_string_lossy().into_owned()));
            }
            "backend" => {
                backend = read_text_field(field).await?;
            }
            "priority" => {
                let raw = read_text_field(field).await?;
                priority = Some(raw.parse().map_err(|_| {
                    AppError::BadRequest(format!("priority must be an integer, got '{raw}'"))
                })?);
            }
            "max_retries" => {
                let raw = read_text_field(field).await?;
                max_retries = Some(raw.parse().map_err(|_| {
                    AppError::BadRequest(format!("max_retries must be an integer, got '{raw}'"))
                })?);
            }
            "" => continue,
            _ => {
                let raw = read_text_field(field).await?;
                options.insert(name, coerce_option_value(&raw));
            }
        }
    }

    let Some((file_name, file_path)) = upload else {
        return Err(AppError::BadRequest("Missing 'file' part".into()));
    };

    let result = state
        .queue
        .submit(
            &auth.principal,
            SubmitTask {
                task_id: task_id.clone(),
                file_name: file_name.clone(),
                file_path,
                backend,
                options: serde_json::Value::Object(options),
                priority,
                max_retries,
            },
        )
        .await;

    let task = match result {
        Ok(task) => task,
        Err(e) => {
            // The row was never created; drop the orphaned upload.
            state.queue.remove_upload(&task_id);
            return Err(e.into());
        }
    };

    tracing::info!(
        task_id = %task.task_id,
        backend = %task.backend,
        priority = task.priority,
        user_id = %auth.principal.user_id,
        "Task submitted",
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            task_id: task.task_id,
            status: task.status,
            file_name,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks/{id}
///
/// Principal-scoped status. When the task is completed and `format` is
/// `markdown`, `json`, or `both`, the requested artifact contents are
/// inlined from disk; missing files surface as absent fields, not errors.
pub async fn get_task(
    auth: AuthUser,
    State(state): State<AppState>,
    UrlPath(task_id): UrlPath<String>,
    Query(params): Query<TaskDetailQuery>,
) -> AppResult<impl IntoResponse> {
    let task = state.queue.get_for(&auth.principal, &task_id).await?;

    let data = match params.format.as_deref() {
        None => None,
        Some(format @ ("markdown" | "json" | "both")) => {
            if task.status == TaskStatus::Completed {
                if params.upload_images {
                    tracing::debug!(task_id = %task.task_id, "upload_images requested; image publishing is delegated to the storage sink");
                }
                Some(inline_artifacts(&task, format).await)
            } else {
                None
            }
        }
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "format must be one of markdown/json/both, got '{other}'"
            )))
        }
    };

    Ok(Json(TaskDetail { task, data }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// DELETE /api/v1/tasks/{id}
///
/// Pending tasks cancel immediately; processing tasks are flagged for
/// cooperative cancellation and report `in_flight`. Terminal tasks 409.
pub async fn cancel_task(
    auth: AuthUser,
    State(state): State<AppState>,
    UrlPath(task_id): UrlPath<String>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.queue.cancel_for(&auth.principal, &task_id).await?;

    tracing::info!(task_id = %task_id, user_id = %auth.principal.user_id, ?outcome, "Task cancellation requested");

    let body = match outcome {
        CancelOutcome::Cancelled => json!({ "cancelled": true }),
        CancelOutcome::InFlight => json!({ "in_flight": true }),
    };
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strip any client-supplied path components from an upload name.
fn sanitize_file_name(raw: &str) -> String {
    Path::new(raw)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {e}")))
}

/// Coerce a form value into a typed JSON value so engines receive
/// `formula_enable=true` as a boolean and numeric knobs as numbers.
fn coerce_option_value(raw: &str) -> serde_json::Value {
    match raw {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
    }
}

/// Read the requested artifacts for a completed task from disk.
async fn inline_artifacts(task: &Task, format: &str) -> TaskData {
    let mut data = TaskData::default();

    let Some(result_dir) = task.result_dir.as_deref() else {
        return data;
    };
    let result_dir = Path::new(result_dir);

    if format == "markdown" || format == "both" {
        if let Some(markdown_file) = task.markdown_file.as_deref() {
            data.markdown_file = Some(markdown_file.to_string());
            data.content = read_artifact(result_dir, markdown_file, &task.task_id).await;
        }
    }

    if format == "json" || format == "both" {
        if let Some(json_file) = task.json_file.as_deref() {
            data.json_file = Some(json_file.to_string());
            data.json_content = read_artifact(result_dir, json_file, &task.task_id).await;
            data.json_available = data.json_content.is_some();
        }
    }

    data
}

async fn read_artifact(result_dir: &Path, rel_path: &str, task_id: &str) -> Option<String> {
    match tokio::fs::read_to_string(result_dir.join(rel_path)).await {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!(task_id, rel_path, error = %e, "Artifact file missing or unreadable");
            None
        }
    }
}
