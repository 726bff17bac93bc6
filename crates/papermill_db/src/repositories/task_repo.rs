//! Repository for the `tasks` table.
//!
//! Every state transition is a single conditional `UPDATE ... RETURNING`
//! statement. SQLite serializes writers, so one statement is atomic
//! without row locks; the `status = ?` guard in each WHERE clause makes a
//! lost race observable as "zero rows updated" instead of a double
//! transition. Transitions are recorded in `task_transitions` within the
//! same transaction.

use chrono::Utc;
use sqlx::Sqlite;

use crate::models::status::TaskStatus;
use crate::models::task::{NewTask, PurgeCandidate, QueueStats, Task, TaskFilter};
use crate::DbPool;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    task_id, owner_user_id, file_name, file_path, backend, options, \
    priority, status, worker_id, cancel_requested, \
    created_at, started_at, completed_at, \
    retry_count, max_retries, error_message, \
    result_dir, markdown_file, json_file";

/// Maximum page size for task listing.
pub const MAX_LIMIT: i64 = 500;

/// Default page size for task listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// Error message recorded when a stale task is reset or exhausted.
pub const STALE_ERROR: &str = "stale";

/// A row from the `task_transitions` audit table.
#[derive(Debug, sqlx::FromRow)]
pub struct TaskTransition {
    pub id: i64,
    pub task_id: String,
    pub from_status: TaskStatus,
    pub to_status: TaskStatus,
    pub worker_id: Option<String>,
    pub detail: Option<String>,
    pub created_at: papermill_core::types::Timestamp,
}

/// Provides atomic operations over background tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new task in `pending` status. Fails on task_id collision.
    pub async fn insert(pool: &DbPool, input: &NewTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                 (task_id, owner_user_id, file_name, file_path, backend, \
                  options, priority, max_retries, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.task_id)
            .bind(&input.owner_user_id)
            .bind(&input.file_name)
            .bind(&input.file_path)
            .bind(&input.backend)
            .bind(sqlx::types::Json(&input.options))
            .bind(input.priority)
            .bind(input.max_retries)
            .bind(TaskStatus::Pending)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Find a task by its id.
    pub async fn find_by_id(pool: &DbPool, task_id: &str) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE task_id = ?");
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the next eligible pending task for a worker.
    ///
    /// Dequeue order is `(priority DESC, created_at ASC, task_id ASC)`.
    /// When `allowed_backends` is non-empty, only matching tasks are
    /// eligible. At most one concurrent caller observes any given task.
    pub async fn claim_next(
        pool: &DbPool,
        worker_id: &str,
        allowed_backends: &[String],
    ) -> Result<Option<Task>, sqlx::Error> {
        let backend_filter = if allowed_backends.is_empty() {
            String::new()
        } else {
            let placeholders = vec!["?"; allowed_backends.len()].join(", ");
            format!("AND backend IN ({placeholders}) ")
        };

        let query = format!(
            "UPDATE tasks \
             SET status = ?, worker_id = ?, started_at = ? \
             WHERE task_id = ( \
                 SELECT task_id FROM tasks \
                 WHERE status = ? {backend_filter}\
                 ORDER BY priority DESC, created_at ASC, task_id ASC \
                 LIMIT 1 \
             ) AND status = ? \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;

        let mut q = sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Processing)
            .bind(worker_id)
            .bind(Utc::now())
            .bind(TaskStatus::Pending);
        for backend in allowed_backends {
            q = q.bind(backend);
        }
        q = q.bind(TaskStatus::Pending);

        let claimed = q.fetch_optional(&mut *tx).await?;

        if let Some(task) = &claimed {
            Self::log_transition(
                &mut tx,
                &task.task_id,
                TaskStatus::Pending,
                TaskStatus::Processing,
                Some(worker_id),
                None,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(claimed)
    }

    /// Mark a claimed task as completed with its artifact locations.
    ///
    /// Returns `None` if the task is no longer `processing` or the claim
    /// has moved to another worker (the caller surfaces this as a
    /// conflict).
    pub async fn complete(
        pool: &DbPool,
        task_id: &str,
        worker_id: &str,
        result_dir: &str,
        markdown_file: Option<&str>,
        json_file: Option<&str>,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status = ?, completed_at = ?, result_dir = ?, \
                 markdown_file = ?, json_file = ? \
             WHERE task_id = ? AND status = ? AND worker_id = ? \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Completed)
            .bind(Utc::now())
            .bind(result_dir)
            .bind(markdown_file)
            .bind(json_file)
            .bind(task_id)
            .bind(TaskStatus::Processing)
            .bind(worker_id)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            Self::log_transition(
                &mut tx,
                task_id,
                TaskStatus::Processing,
                TaskStatus::Completed,
                Some(worker_id),
                None,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Record a task failure.
    ///
    /// Retryable failures with budget remaining go back to `pending` with
    /// `retry_count + 1` and a cleared claim; everything else becomes
    /// `failed` with `completed_at` set. The retry decision happens inside
    /// the statement so `retry_count` can never exceed `max_retries`.
    pub async fn fail(
        pool: &DbPool,
        task_id: &str,
        worker_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET \
                 status = CASE WHEN ? AND retry_count < max_retries THEN ? ELSE ? END, \
                 retry_count = CASE WHEN ? AND retry_count < max_retries \
                     THEN retry_count + 1 ELSE retry_count END, \
                 worker_id = CASE WHEN ? AND retry_count < max_retries \
                     THEN NULL ELSE worker_id END, \
                 started_at = CASE WHEN ? AND retry_count < max_retries \
                     THEN NULL ELSE started_at END, \
                 completed_at = CASE WHEN ? AND retry_count < max_retries \
                     THEN NULL ELSE ? END, \
                 error_message = ? \
             WHERE task_id = ? AND status = ? AND worker_id = ? \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Task>(&query)
            .bind(retryable)
            .bind(TaskStatus::Pending)
            .bind(TaskStatus::Failed)
            .bind(retryable)
            .bind(retryable)
            .bind(retryable)
            .bind(retryable)
            .bind(Utc::now())
            .bind(error)
            .bind(task_id)
            .bind(TaskStatus::Processing)
            .bind(worker_id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(task) = &updated {
            Self::log_transition(
                &mut tx,
                task_id,
                TaskStatus::Processing,
                task.status,
                Some(worker_id),
                Some(error),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Cancel a pending task directly.
    ///
    /// Returns `None` if the task is not `pending` (processing tasks go
    /// through [`TaskRepo::request_cancel`] instead).
    pub async fn cancel_pending(
        pool: &DbPool,
        task_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET status = ?, completed_at = ? \
             WHERE task_id = ? AND status = ? \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Cancelled)
            .bind(Utc::now())
            .bind(task_id)
            .bind(TaskStatus::Pending)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            Self::log_transition(
                &mut tx,
                task_id,
                TaskStatus::Pending,
                TaskStatus::Cancelled,
                None,
                Some("cancelled by user"),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Flag a processing task for cooperative cancellation.
    ///
    /// The owning worker observes the flag at its next checkpoint.
    /// Returns `false` if the task is not currently `processing`.
    pub async fn request_cancel(pool: &DbPool, task_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET cancel_requested = 1 WHERE task_id = ? AND status = ?",
        )
        .bind(task_id)
        .bind(TaskStatus::Processing)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Read the cooperative cancellation flag for a task.
    pub async fn cancel_requested(pool: &DbPool, task_id: &str) -> Result<bool, sqlx::Error> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT cancel_requested FROM tasks WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(pool)
                .await?;
        Ok(flag.unwrap_or(false))
    }

    /// Transition a processing task to `cancelled` after the owning worker
    /// observed the cancellation flag and discarded its output.
    pub async fn finish_cancelled(
        pool: &DbPool,
        task_id: &str,
        worker_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET status = ?, completed_at = ? \
             WHERE task_id = ? AND status = ? AND worker_id = ? \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Cancelled)
            .bind(Utc::now())
            .bind(task_id)
            .bind(TaskStatus::Processing)
            .bind(worker_id)
            .fetch_optional(&mut *tx)
            .await?;

        if updated.is_some() {
            Self::log_transition(
                &mut tx,
                task_id,
                TaskStatus::Processing,
                TaskStatus::Cancelled,
                Some(worker_id),
                Some("cancel observed by worker"),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Reset processing tasks whose claim is older than `cutoff`.
    ///
    /// Tasks with retry budget left go back to `pending` with
    /// `retry_count + 1`; exhausted tasks become `failed` with the
    /// error message `"stale"`. Returns the number of tasks affected.
    pub async fn reset_stale(
        pool: &DbPool,
        cutoff: papermill_core::types::Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let query = "\
            UPDATE tasks SET \
                status = CASE WHEN retry_count < max_retries THEN ? ELSE ? END, \
                retry_count = CASE WHEN retry_count < max_retries \
                    THEN retry_count + 1 ELSE retry_count END, \
                worker_id = CASE WHEN retry_count < max_retries \
                    THEN NULL ELSE worker_id END, \
                started_at = CASE WHEN retry_count < max_retries \
                    THEN NULL ELSE started_at END, \
                completed_at = CASE WHEN retry_count < max_retries \
                    THEN NULL ELSE ? END, \
                error_message = ? \
            WHERE status = ? AND started_at < ? \
            RETURNING task_id, status, worker_id";

        let mut tx = pool.begin().await?;

        let affected: Vec<(String, TaskStatus, Option<String>)> = sqlx::query_as(query)
            .bind(TaskStatus::Pending)
            .bind(TaskStatus::Failed)
            .bind(Utc::now())
            .bind(STALE_ERROR)
            .bind(TaskStatus::Processing)
            .bind(cutoff)
            .fetch_all(&mut *tx)
            .await?;

        for (task_id, status, worker_id) in &affected {
            Self::log_transition(
                &mut tx,
                task_id,
                TaskStatus::Processing,
                *status,
                worker_id.as_deref(),
                Some(STALE_ERROR),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(affected.len() as u64)
    }

    /// List terminal tasks older than `cutoff`, for retention cleanup.
    pub async fn list_purgeable(
        pool: &DbPool,
        cutoff: papermill_core::types::Timestamp,
    ) -> Result<Vec<PurgeCandidate>, sqlx::Error> {
        sqlx::query_as::<_, PurgeCandidate>(
            "SELECT task_id, result_dir, file_path FROM tasks \
             WHERE status IN (?, ?, ?) \
               AND completed_at IS NOT NULL AND completed_at < ?",
        )
        .bind(TaskStatus::Completed)
        .bind(TaskStatus::Failed)
        .bind(TaskStatus::Cancelled)
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }

    /// Hard-delete task rows by id. Audit rows cascade.
    pub async fn delete_by_ids(pool: &DbPool, task_ids: &[String]) -> Result<u64, sqlx::Error> {
        if task_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; task_ids.len()].join(", ");
        let query = format!("DELETE FROM tasks WHERE task_id IN ({placeholders})");

        let mut q = sqlx::query(&query);
        for task_id in task_ids {
            q = q.bind(task_id);
        }

        let result = q.execute(pool).await?;
        Ok(result.rows_affected())
    }

    /// Count tasks in each status.
    pub async fn stats(pool: &DbPool) -> Result<QueueStats, sqlx::Error> {
        sqlx::query_as::<_, QueueStats>(
            "SELECT \
                 COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS pending, \
                 COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS processing, \
                 COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS completed, \
                 COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS failed, \
                 COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS cancelled, \
                 COUNT(*) AS total \
             FROM tasks",
        )
        .bind(TaskStatus::Pending)
        .bind(TaskStatus::Processing)
        .bind(TaskStatus::Completed)
        .bind(TaskStatus::Failed)
        .bind(TaskStatus::Cancelled)
        .fetch_one(pool)
        .await
    }

    /// List tasks matching the filter, newest first.
    pub async fn list(pool: &DbPool, filter: &TaskFilter) -> Result<Vec<Task>, sqlx::Error> {
        let limit = Self::clamp_limit(filter.limit);
        let offset = filter.offset.max(0);
        let where_clause = Self::filter_clause(filter);

        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             {where_clause} \
             ORDER BY created_at DESC \
             LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query_as::<_, Task>(&query);
        if let Some(owner) = &filter.owner_user_id {
            q = q.bind(owner);
        }
        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count tasks matching the filter (ignores pagination).
    pub async fn count(pool: &DbPool, filter: &TaskFilter) -> Result<i64, sqlx::Error> {
        let where_clause = Self::filter_clause(filter);
        let query = format!("SELECT COUNT(*) FROM tasks {where_clause}");

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        if let Some(owner) = &filter.owner_user_id {
            q = q.bind(owner);
        }
        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        q.fetch_one(pool).await
    }

    /// Read the audit trail for a task, oldest first.
    pub async fn transitions(
        pool: &DbPool,
        task_id: &str,
    ) -> Result<Vec<TaskTransition>, sqlx::Error> {
        sqlx::query_as::<_, TaskTransition>(
            "SELECT id, task_id, from_status, to_status, worker_id, detail, created_at \
             FROM task_transitions WHERE task_id = ? ORDER BY id ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    fn clamp_limit(limit: i64) -> i64 {
        if limit <= 0 {
            DEFAULT_LIMIT
        } else {
            limit.min(MAX_LIMIT)
        }
    }

    fn filter_clause(filter: &TaskFilter) -> String {
        let mut conditions: Vec<&str> = Vec::new();
        if filter.owner_user_id.is_some() {
            conditions.push("owner_user_id = ?");
        }
        if filter.status.is_some() {
            conditions.push("status = ?");
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }

    async fn log_transition(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
        worker_id: Option<&str>,
        detail: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO task_transitions \
                 (task_id, from_status, to_status, worker_id, detail, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(from)
        .bind(to)
        .bind(worker_id)
        .bind(detail)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
