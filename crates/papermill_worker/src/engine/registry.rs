//! Backend-name to engine-adapter registry.

use std::collections::HashMap;
use std::sync::Arc;

use papermill_core::backend::{
    BACKEND_FASTA, BACKEND_GENBANK, BACKEND_MARKITDOWN, BACKEND_PADDLEOCR_VL, BACKEND_PIPELINE,
    BACKEND_SENSEVOICE, BACKEND_VIDEO,
};

use crate::config::Device;

use super::command::CommandEngine;
use super::EngineAdapter;

/// Default external program per backend. Overridable per backend via
/// `ENGINE_CMD_<BACKEND>` (dashes become underscores, uppercased).
const DEFAULT_ENGINE_COMMANDS: &[(&str, &str)] = &[
    (BACKEND_PIPELINE, "pipeline-engine"),
    (BACKEND_PADDLEOCR_VL, "paddleocr-vl-engine"),
    (BACKEND_MARKITDOWN, "markitdown-engine"),
    (BACKEND_SENSEVOICE, "sensevoice-engine"),
    (BACKEND_VIDEO, "video-engine"),
    (BACKEND_FASTA, "seq-engine"),
    (BACKEND_GENBANK, "seq-engine"),
];

/// Maps backend names to engine adapters for one device binding.
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn EngineAdapter>>,
}

impl EngineRegistry {
    /// Registry with no engines; used by tests to inject stubs.
    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Build the stock command-engine registry for a device, applying
    /// `ENGINE_CMD_*` overrides from the environment.
    pub fn from_env(device: Device) -> Self {
        let mut registry = Self::empty();
        for (backend, default_program) in DEFAULT_ENGINE_COMMANDS {
            let env_key = format!(
                "ENGINE_CMD_{}",
                backend.replace('-', "_").to_ascii_uppercase()
            );
            let program = std::env::var(&env_key).unwrap_or_else(|_| default_program.to_string());
            registry.insert(backend, Arc::new(CommandEngine::new(backend, &program, device)));
        }
        registry
    }

    /// Register (or replace) an adapter for a backend.
    pub fn insert(&mut self, backend: &str, engine: Arc<dyn EngineAdapter>) {
        self.engines.insert(backend.to_string(), engine);
    }

    /// Look up the adapter for a backend name.
    pub fn resolve(&self, backend: &str) -> Option<Arc<dyn EngineAdapter>> {
        self.engines.get(backend).cloned()
    }
}
