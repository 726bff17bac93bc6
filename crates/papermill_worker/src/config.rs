//! Worker configuration and device binding.

use std::path::PathBuf;
use std::time::Duration;

/// A compute device a worker slot is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(u32),
}

impl Device {
    /// Parse the `DEVICES` value: `"cpu"` or comma-separated GPU indices
    /// like `"0,1"`.
    pub fn parse_list(raw: &str) -> Result<Vec<Device>, String> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("cpu") {
            return Ok(vec![Device::Cpu]);
        }
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u32>()
                    .map(Device::Cuda)
                    .map_err(|_| format!("Invalid device index '{s}' in DEVICES"))
            })
            .collect()
    }

    /// GPU index for `CUDA_VISIBLE_DEVICES` injection, if any.
    pub fn cuda_index(self) -> Option<u32> {
        match self {
            Device::Cpu => None,
            Device::Cuda(index) => Some(index),
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda{index}"),
        }
    }
}

/// Worker runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Prefix for generated worker ids (default: `papermill`).
    pub worker_prefix: String,
    /// Devices to bind worker slots to (default: `0`).
    pub devices: Vec<Device>,
    /// Worker slots per device (default: 1 -- one model per GPU).
    pub workers_per_device: usize,
    /// Sleep between empty claim attempts (default: 500 ms).
    pub poll_interval: Duration,
    /// Backends this process may claim; empty means any.
    pub allowed_backends: Vec<String>,
    /// Port for the health endpoint (default: 9000; 0 disables it).
    pub worker_port: u16,
    /// Root directory for persisted uploads.
    pub upload_root: PathBuf,
    /// Root directory for engine artifacts.
    pub output_root: PathBuf,
    /// SQLite database file shared with the API process.
    pub db_path: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default             |
    /// |----------------------|---------------------|
    /// | `WORKER_PREFIX`      | `papermill`         |
    /// | `DEVICES`            | `0`                 |
    /// | `WORKERS_PER_DEVICE` | `1`                 |
    /// | `POLL_INTERVAL_MS`   | `500`               |
    /// | `ALLOWED_BACKENDS`   | empty (any)         |
    /// | `WORKER_PORT`        | `9000` (0 disables) |
    /// | `UPLOAD_ROOT`        | `data/uploads`      |
    /// | `OUTPUT_ROOT`        | `data/output`       |
    /// | `DB_PATH`            | `data/papermill.db` |
    pub fn from_env() -> Result<Self, String> {
        let devices = Device::parse_list(&std::env::var("DEVICES").unwrap_or_else(|_| "0".into()))?;
        if devices.is_empty() {
            return Err("DEVICES must name at least one device".to_string());
        }

        let workers_per_device: usize = std::env::var("WORKERS_PER_DEVICE")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .map_err(|_| "WORKERS_PER_DEVICE must be a positive integer".to_string())?;
        if workers_per_device == 0 {
            return Err("WORKERS_PER_DEVICE must be at least 1".to_string());
        }

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .map_err(|_| "POLL_INTERVAL_MS must be a valid u64".to_string())?;

        let allowed_backends: Vec<String> = std::env::var("ALLOWED_BACKENDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            worker_prefix: std::env::var("WORKER_PREFIX").unwrap_or_else(|_| "papermill".into()),
            devices,
            workers_per_device,
            poll_interval: Duration::from_millis(poll_interval_ms),
            allowed_backends,
            worker_port: std::env::var("WORKER_PORT")
                .unwrap_or_else(|_| "9000".into())
                .parse()
                .map_err(|_| "WORKER_PORT must be a valid u16".to_string())?,
            upload_root: PathBuf::from(
                std::env::var("UPLOAD_ROOT").unwrap_or_else(|_| "data/uploads".into()),
            ),
            output_root: PathBuf::from(
                std::env::var("OUTPUT_ROOT").unwrap_or_else(|_| "data/output".into()),
            ),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "data/papermill.db".into()),
        })
    }
}
