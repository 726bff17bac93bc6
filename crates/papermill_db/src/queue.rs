//! Queue service: the semantic layer over [`TaskRepo`].
//!
//! Enforces principal scoping, normalizes and defaults submission fields,
//! owns the task-partitioned filesystem roots (`uploads/<task_id>/`,
//! `output/<task_id>/`), and translates store results into the error
//! taxonomy the API maps onto HTTP statuses.

use std::path::{Path, PathBuf};

use chrono::Utc;

use papermill_core::backend::normalize_backend;
use papermill_core::lifecycle::DEFAULT_MAX_RETRIES;
use papermill_core::principal::Principal;

use crate::models::status::TaskStatus;
use crate::models::task::{NewTask, QueueStats, Task, TaskFilter, TaskListQuery};
use crate::repositories::TaskRepo;
use crate::DbPool;

/// Errors surfaced by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    PermissionDenied(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Outcome of a cancellation request.
#[derive(Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was pending and is now cancelled.
    Cancelled,
    /// The task is processing; the flag is set and the owning worker will
    /// observe it at its next checkpoint.
    InFlight,
}

/// Input for task submission, before normalization and defaulting.
#[derive(Debug)]
pub struct SubmitTask {
    pub task_id: String,
    pub file_name: String,
    pub file_path: String,
    pub backend: String,
    pub options: serde_json::Value,
    pub priority: Option<i64>,
    pub max_retries: Option<i64>,
}

/// Queue operations shared by the API facade and the worker runtime.
#[derive(Clone)]
pub struct QueueService {
    pool: DbPool,
    upload_root: PathBuf,
    output_root: PathBuf,
}

impl QueueService {
    pub fn new(pool: DbPool, upload_root: PathBuf, output_root: PathBuf) -> Self {
        Self {
            pool,
            upload_root,
            output_root,
        }
    }

    /// The artifact directory owned by a task.
    pub fn task_output_dir(&self, task_id: &str) -> PathBuf {
        self.output_root.join(task_id)
    }

    /// The upload directory owned by a task.
    pub fn task_upload_dir(&self, task_id: &str) -> PathBuf {
        self.upload_root.join(task_id)
    }

    // -----------------------------------------------------------------------
    // Principal-facing operations
    // -----------------------------------------------------------------------

    /// Submit a new task. Normalizes the backend (resolving `auto` from
    /// the file name), defaults priority and retry budget, and inserts
    /// the row in `pending` status.
    pub async fn submit(
        &self,
        principal: &Principal,
        input: SubmitTask,
    ) -> Result<Task, QueueError> {
        if !principal.can_submit() {
            return Err(QueueError::PermissionDenied(
                "Role is not allowed to submit tasks".into(),
            ));
        }

        if input.file_name.trim().is_empty() {
            return Err(QueueError::InvalidInput("Missing file name".into()));
        }

        let backend = normalize_backend(&input.backend, &input.file_name)
            .map_err(QueueError::InvalidInput)?;

        let max_retries = input.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries < 0 {
            return Err(QueueError::InvalidInput(
                "max_retries must be non-negative".into(),
            ));
        }

        let new_task = NewTask {
            task_id: input.task_id,
            owner_user_id: principal.user_id.clone(),
            file_name: input.file_name,
            file_path: input.file_path,
            backend,
            options: input.options,
            priority: input.priority.unwrap_or(0),
            max_retries,
        };

        TaskRepo::insert(&self.pool, &new_task)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    QueueError::Conflict(format!("Task id already exists: {}", new_task.task_id))
                }
                _ => QueueError::Store(e),
            })
    }

    /// Fetch a task visible to the principal.
    ///
    /// Tasks owned by other users are reported as not found rather than
    /// forbidden, so ids cannot be probed.
    pub async fn get_for(
        &self,
        principal: &Principal,
        task_id: &str,
    ) -> Result<Task, QueueError> {
        let task = TaskRepo::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(task_id.to_string()))?;

        if task.owner_user_id != principal.user_id && !principal.has_global_view() {
            return Err(QueueError::NotFound(task_id.to_string()));
        }

        Ok(task)
    }

    /// Cancel a task on behalf of the principal.
    ///
    /// Pending tasks cancel immediately and their upload is removed.
    /// Processing tasks get the cooperative flag. Terminal tasks conflict.
    pub async fn cancel_for(
        &self,
        principal: &Principal,
        task_id: &str,
    ) -> Result<CancelOutcome, QueueError> {
        let task = self.get_for(principal, task_id).await?;

        match task.status {
            TaskStatus::Pending => {
                if TaskRepo::cancel_pending(&self.pool, task_id).await?.is_some() {
                    self.remove_upload(task_id);
                    return Ok(CancelOutcome::Cancelled);
                }
                // Lost the race against a claim; fall through to the
                // cooperative path.
                if TaskRepo::request_cancel(&self.pool, task_id).await? {
                    return Ok(CancelOutcome::InFlight);
                }
                Err(QueueError::Conflict(format!(
                    "Task {task_id} is already in a terminal state"
                )))
            }
            TaskStatus::Processing => {
                if TaskRepo::request_cancel(&self.pool, task_id).await? {
                    Ok(CancelOutcome::InFlight)
                } else {
                    Err(QueueError::Conflict(format!(
                        "Task {task_id} is already in a terminal state"
                    )))
                }
            }
            status => Err(QueueError::Conflict(format!(
                "Cannot cancel task {task_id} in {status} status"
            ))),
        }
    }

    /// List tasks visible to the principal, newest first, with the total
    /// count matching the filter.
    pub async fn list_for(
        &self,
        principal: &Principal,
        query: &TaskListQuery,
    ) -> Result<(Vec<Task>, i64), QueueError> {
        let status = match &query.status {
            Some(value) => Some(TaskStatus::parse(value).ok_or_else(|| {
                QueueError::InvalidInput(format!("Unknown status filter: '{value}'"))
            })?),
            None => None,
        };

        let filter = TaskFilter {
            owner_user_id: if principal.has_global_view() {
                None
            } else {
                Some(principal.user_id.clone())
            },
            status,
            limit: query.limit.unwrap_or(0),
            offset: query.offset.unwrap_or(0),
        };

        let tasks = TaskRepo::list(&self.pool, &filter).await?;
        let total = TaskRepo::count(&self.pool, &filter).await?;
        Ok((tasks, total))
    }

    /// Per-status task counts.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(TaskRepo::stats(&self.pool).await?)
    }

    // -----------------------------------------------------------------------
    // Maintenance operations
    // -----------------------------------------------------------------------

    /// Reset processing tasks older than `threshold` back to the queue
    /// (or to `failed` once their retry budget is exhausted).
    pub async fn reset_stale(&self, threshold: chrono::Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - threshold;
        Ok(TaskRepo::reset_stale(&self.pool, cutoff).await?)
    }

    /// Delete terminal tasks older than `retention` together with their
    /// artifact and upload directories. Directory removal is best-effort;
    /// the row is deleted regardless.
    pub async fn purge_old(&self, retention: chrono::Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - retention;
        let candidates = TaskRepo::list_purgeable(&self.pool, cutoff).await?;

        let mut ids = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            if let Some(result_dir) = &candidate.result_dir {
                remove_dir_best_effort(Path::new(result_dir), &candidate.task_id);
            }
            self.remove_upload(&candidate.task_id);
            ids.push(candidate.task_id.clone());
        }

        Ok(TaskRepo::delete_by_ids(&self.pool, &ids).await?)
    }

    // -----------------------------------------------------------------------
    // Worker-facing operations
    // -----------------------------------------------------------------------

    /// Claim the next pending task for a worker. `allowed_backends` empty
    /// means any backend.
    pub async fn claim_next(
        &self,
        worker_id: &str,
        allowed_backends: &[String],
    ) -> Result<Option<Task>, QueueError> {
        Ok(TaskRepo::claim_next(&self.pool, worker_id, allowed_backends).await?)
    }

    /// Record a successful parse. Conflicts if the claim moved.
    pub async fn complete(
        &self,
        task_id: &str,
        worker_id: &str,
        result_dir: &str,
        markdown_file: Option<&str>,
        json_file: Option<&str>,
    ) -> Result<Task, QueueError> {
        TaskRepo::complete(
            &self.pool,
            task_id,
            worker_id,
            result_dir,
            markdown_file,
            json_file,
        )
        .await?
        .ok_or_else(|| {
            QueueError::Conflict(format!(
                "Task {task_id} is no longer processing under worker {worker_id}"
            ))
        })
    }

    /// Record a failed parse, rescheduling retryable failures.
    pub async fn fail(
        &self,
        task_id: &str,
        worker_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<Task, QueueError> {
        TaskRepo::fail(&self.pool, task_id, worker_id, error, retryable)
            .await?
            .ok_or_else(|| {
                QueueError::Conflict(format!(
                    "Task {task_id} is no longer processing under worker {worker_id}"
                ))
            })
    }

    /// Whether cooperative cancellation was requested for a task.
    pub async fn cancel_requested(&self, task_id: &str) -> Result<bool, QueueError> {
        Ok(TaskRepo::cancel_requested(&self.pool, task_id).await?)
    }

    /// Finish a cooperatively cancelled task: discard any artifacts the
    /// engine produced and mark the task cancelled.
    pub async fn finish_cancelled(
        &self,
        task_id: &str,
        worker_id: &str,
    ) -> Result<Task, QueueError> {
        self.discard_artifacts(task_id);

        let task = TaskRepo::finish_cancelled(&self.pool, task_id, worker_id)
            .await?
            .ok_or_else(|| {
                QueueError::Conflict(format!(
                    "Task {task_id} is no longer processing under worker {worker_id}"
                ))
            })?;

        self.remove_upload(task_id);
        Ok(task)
    }

    /// Remove a task's upload directory. Best-effort: a missing directory
    /// is not an error.
    pub fn remove_upload(&self, task_id: &str) {
        remove_dir_best_effort(&self.task_upload_dir(task_id), task_id);
    }

    /// Remove a task's artifact directory (partial output after a failed
    /// or discarded parse). Best-effort.
    pub fn discard_artifacts(&self, task_id: &str) {
        remove_dir_best_effort(&self.task_output_dir(task_id), task_id);
    }
}

fn remove_dir_best_effort(dir: &Path, task_id: &str) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(dir) {
        tracing::warn!(task_id, dir = %dir.display(), error = %e, "Failed to remove task directory");
    }
}
