//! Command-based engine adapter.
//!
//! Every stock backend is an external program invoked as
//!
//! ```text
//! <program> <input-path> --output-dir <dir> --options <json>
//! ```
//!
//! and expected to write `<task_id>.md` (and optionally `<task_id>.json`)
//! into the output directory, where `<task_id>` is the directory's name.
//! GPU binding is injected via `CUDA_VISIBLE_DEVICES`, so the engine
//! process only ever sees its assigned card as logical device 0.

use std::path::Path;
use std::process::ExitStatus;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Device;

use super::{EngineAdapter, EngineError, ParseOutput};

/// Exit code an engine uses to flag a retryable failure (EX_TEMPFAIL).
const EXIT_TEMPFAIL: i32 = 75;

/// Sysexits range reserved for unrecoverable input/usage errors.
const EXIT_PERMANENT_RANGE: std::ops::RangeInclusive<i32> = 64..=74;

pub struct CommandEngine {
    backend: String,
    program: String,
    device: Device,
}

impl CommandEngine {
    pub fn new(backend: &str, program: &str, device: Device) -> Self {
        Self {
            backend: backend.to_string(),
            program: program.to_string(),
            device,
        }
    }
}

#[async_trait]
impl EngineAdapter for CommandEngine {
    fn name(&self) -> &str {
        &self.backend
    }

    async fn parse(
        &self,
        input: &Path,
        options: &serde_json::Value,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ParseOutput, EngineError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg(input)
            .arg("--output-dir")
            .arg(output_dir)
            .arg("--options")
            .arg(options.to_string())
            .kill_on_drop(true);

        if let Some(index) = self.device.cuda_index() {
            cmd.env("CUDA_VISIBLE_DEVICES", index.to_string());
        }

        tracing::debug!(
            backend = %self.backend,
            program = %self.program,
            input = %input.display(),
            "Spawning engine process",
        );

        let mut child = cmd.spawn().map_err(|e| {
            // A missing or broken engine binary will not heal on retry.
            EngineError::Permanent(format!(
                "Failed to launch engine '{}': {e}",
                self.program
            ))
        })?;

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| EngineError::Transient(format!("Engine wait failed: {e}")))?,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(EngineError::Cancelled);
            }
        };

        if !status.success() {
            return Err(classify_exit(&self.program, status));
        }

        // The engine contract names artifacts after the task id, which is
        // the output directory's name.
        let stem = output_dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let markdown_file = format!("{stem}.md");
        if !output_dir.join(&markdown_file).is_file() {
            return Err(EngineError::Permanent(format!(
                "Engine '{}' exited cleanly but produced no {markdown_file}",
                self.program
            )));
        }

        let json_file = format!("{stem}.json");
        let json_file = output_dir.join(&json_file).is_file().then_some(json_file);

        Ok(ParseOutput {
            markdown_file,
            json_file,
        })
    }
}

/// Map an engine exit status onto the retry taxonomy.
///
/// Sysexits 64-74 (usage, bad data, missing input) are permanent;
/// EX_TEMPFAIL and signal deaths (OOM kills arrive as SIGKILL) are
/// transient, as is any other nonzero code from a crashing engine.
fn classify_exit(program: &str, status: ExitStatus) -> EngineError {
    match status.code() {
        Some(code) if EXIT_PERMANENT_RANGE.contains(&code) => {
            EngineError::Permanent(format!("Engine '{program}' rejected input (exit {code})"))
        }
        Some(EXIT_TEMPFAIL) => {
            EngineError::Transient(format!("Engine '{program}' reported a temporary failure"))
        }
        Some(code) => EngineError::Transient(format!("Engine '{program}' crashed (exit {code})")),
        None => EngineError::Transient(format!("Engine '{program}' was killed by a signal")),
    }
}
