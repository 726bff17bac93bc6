//! Engine adapter interface.
//!
//! Parsing engines are external collaborators: model runtimes, OCR
//! binaries, converters. The worker only knows this trait; the registry
//! maps backend names to adapters.

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod command;
pub mod registry;

/// Error reported by an engine invocation.
///
/// The transient/permanent split drives the retry decision: transient
/// failures (OOM, model warmup, I/O blips, crashes) are retried up to the
/// task's budget, permanent failures (unsupported input, schema
/// violations) fail the task immediately.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    #[error("parse cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

/// Artifacts produced by a successful parse, relative to the output dir.
#[derive(Debug)]
pub struct ParseOutput {
    pub markdown_file: String,
    pub json_file: Option<String>,
}

/// A parsing engine the worker can invoke.
///
/// Implementations should check `cancel` at whatever cadence they can
/// afford; engines that cannot honor it simply run to completion, and the
/// worker discards the result post-hoc.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Parse `input` into `output_dir`, returning the artifact paths.
    async fn parse(
        &self,
        input: &Path,
        options: &serde_json::Value,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ParseOutput, EngineError>;
}
