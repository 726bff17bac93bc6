//! The worker claim/execute loop.
//!
//! Single-threaded cooperative per worker slot: claim, parse, report,
//! repeat. A failure in one task never takes the worker down; store
//! errors back off for one poll interval and the loop continues.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use papermill_db::models::task::Task;
use papermill_db::queue::{QueueError, QueueService};

use crate::engine::registry::EngineRegistry;
use crate::engine::EngineError;

/// How often the cancellation watcher polls the store flag while an
/// engine is running.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct Worker {
    queue: QueueService,
    registry: Arc<EngineRegistry>,
    worker_id: String,
    allowed_backends: Vec<String>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        queue: QueueService,
        registry: Arc<EngineRegistry>,
        worker_id: String,
        allowed_backends: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            worker_id,
            allowed_backends,
            poll_interval,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run the claim/execute loop until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_id = %self.worker_id,
            allowed_backends = ?self.allowed_backends,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker started",
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.poll_once(&cancel).await {
                // Processed a task; immediately try for the next one.
                Ok(true) => continue,
                // Queue empty: sleep one poll interval.
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(worker_id = %self.worker_id, error = %e, "Worker loop error");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// Claim and process at most one task. Returns whether a task was
    /// claimed. Engine failures are absorbed into the task record; only
    /// store errors propagate.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<bool, QueueError> {
        let Some(task) = self
            .queue
            .claim_next(&self.worker_id, &self.allowed_backends)
            .await?
        else {
            return Ok(false);
        };

        tracing::info!(
            worker_id = %self.worker_id,
            task_id = %task.task_id,
            backend = %task.backend,
            retry_count = task.retry_count,
            "Task claimed",
        );

        self.process(task, cancel).await?;
        Ok(true)
    }

    async fn process(&self, task: Task, cancel: &CancellationToken) -> Result<(), QueueError> {
        let task_id = task.task_id.clone();

        let Some(engine) = self.registry.resolve(&task.backend) else {
            self.queue
                .fail(
                    &task_id,
                    &self.worker_id,
                    &format!("No engine registered for backend '{}'", task.backend),
                    false,
                )
                .await?;
            return Ok(());
        };

        // A cancellation may have landed between submit and claim.
        if self.queue.cancel_requested(&task_id).await? {
            self.queue.finish_cancelled(&task_id, &self.worker_id).await?;
            tracing::info!(task_id = %task_id, "Task cancelled before parse started");
            return Ok(());
        }

        let output_dir = self.queue.task_output_dir(&task_id);
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            self.queue
                .fail(
                    &task_id,
                    &self.worker_id,
                    &format!("Cannot create artifact directory: {e}"),
                    true,
                )
                .await?;
            return Ok(());
        }

        // Engines observe cancellation through a child token; a watcher
        // trips it when the user flags the task mid-parse.
        let parse_cancel = cancel.child_token();
        let watcher = tokio::spawn(watch_cancel_flag(
            self.queue.clone(),
            task_id.clone(),
            parse_cancel.clone(),
        ));

        let result = engine
            .parse(
                Path::new(&task.file_path),
                &task.options,
                &output_dir,
                &parse_cancel,
            )
            .await;

        watcher.abort();

        match result {
            Ok(output) => {
                // The engine may have finished after a cancellation the
                // adapter could not observe; the result is discarded.
                if self.queue.cancel_requested(&task_id).await? {
                    self.queue.finish_cancelled(&task_id, &self.worker_id).await?;
                    tracing::info!(task_id = %task_id, "Task cancelled post-hoc; result discarded");
                    return Ok(());
                }

                match self
                    .queue
                    .complete(
                        &task_id,
                        &self.worker_id,
                        &output_dir.to_string_lossy(),
                        Some(&output.markdown_file),
                        output.json_file.as_deref(),
                    )
                    .await
                {
                    Ok(_) => {
                        self.queue.remove_upload(&task_id);
                        tracing::info!(
                            task_id = %task_id,
                            worker_id = %self.worker_id,
                            markdown_file = %output.markdown_file,
                            "Task completed",
                        );
                    }
                    Err(QueueError::Conflict(msg)) => {
                        // The claim moved (stale reset) while we were
                        // parsing; our result is no longer wanted.
                        tracing::warn!(task_id = %task_id, %msg, "Completion rejected; discarding result");
                        self.queue.discard_artifacts(&task_id);
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(EngineError::Cancelled) => {
                self.queue.finish_cancelled(&task_id, &self.worker_id).await?;
                tracing::info!(task_id = %task_id, "Task cancelled during parse");
            }
            Err(e) => {
                let retryable = e.is_retryable();
                self.queue.discard_artifacts(&task_id);

                match self
                    .queue
                    .fail(&task_id, &self.worker_id, &e.to_string(), retryable)
                    .await
                {
                    Ok(failed) => {
                        if failed.status.is_terminal() {
                            self.queue.remove_upload(&task_id);
                        }
                        tracing::warn!(
                            task_id = %task_id,
                            retryable,
                            status = %failed.status,
                            error = %e,
                            "Task failed",
                        );
                    }
                    Err(QueueError::Conflict(msg)) => {
                        tracing::warn!(task_id = %task_id, %msg, "Failure report rejected");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }
}

/// Poll the store's cancellation flag and trip the engine token when set.
async fn watch_cancel_flag(queue: QueueService, task_id: String, token: CancellationToken) {
    loop {
        tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
        match queue.cancel_requested(&task_id).await {
            Ok(true) => {
                tracing::debug!(task_id = %task_id, "Cancellation flag observed; signalling engine");
                token.cancel();
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Cancellation flag poll failed");
            }
        }
    }
}
