use std::path::PathBuf;

use crate::auth::jwt::JwtConfig;

/// A statically configured API key mapped to a service principal.
///
/// Parsed from the `API_KEYS` env var as `key:user_id:role` entries
/// separated by commas.
#[derive(Debug, Clone)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
    pub role: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub api_port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`; matters for large
    /// uploads and inline-content status calls).
    pub request_timeout_secs: u64,
    /// Maximum multipart upload size in bytes (default: 500 MiB).
    pub max_upload_size_bytes: usize,
    /// Root directory for persisted uploads (`uploads/<task_id>/`).
    pub upload_root: PathBuf,
    /// Root directory for engine artifacts (`output/<task_id>/`).
    pub output_root: PathBuf,
    /// SQLite database file.
    pub db_path: String,
    /// Processing tasks older than this are presumed abandoned (default: 60).
    pub stale_timeout_minutes: i64,
    /// Terminal tasks older than this are purged (default: 7).
    pub purge_retention_days: i64,
    /// Cadence of the stale-reset maintenance pass (default: 5).
    pub maintenance_reset_interval_minutes: u64,
    /// Cadence of the retention purge pass (default: 6).
    pub maintenance_purge_interval_hours: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    /// Static API keys for service principals.
    pub api_keys: Vec<ApiKeyEntry>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                               | Default                 |
    /// |---------------------------------------|-------------------------|
    /// | `HOST`                                | `0.0.0.0`               |
    /// | `API_PORT`                            | `8000`                  |
    /// | `CORS_ORIGINS`                        | `http://localhost:5173` |
    /// | `MAX_REQUEST_TIMEOUT_SECS`            | `300`                   |
    /// | `MAX_UPLOAD_SIZE_BYTES`               | `524288000`             |
    /// | `UPLOAD_ROOT`                         | `data/uploads`          |
    /// | `OUTPUT_ROOT`                         | `data/output`           |
    /// | `DB_PATH`                             | `data/papermill.db`     |
    /// | `STALE_TIMEOUT_MINUTES`               | `60`                    |
    /// | `PURGE_RETENTION_DAYS`                | `7`                     |
    /// | `MAINTENANCE_RESET_INTERVAL_MINUTES`  | `5`                     |
    /// | `MAINTENANCE_PURGE_INTERVAL_HOURS`    | `6`                     |
    /// | `JWT_SECRET`                          | **required**            |
    /// | `API_KEYS`                            | empty                   |
    pub fn from_env() -> Result<Self, String> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            api_port: parse_env("API_PORT", 8000)?,
            cors_origins,
            request_timeout_secs: parse_env("MAX_REQUEST_TIMEOUT_SECS", 300)?,
            max_upload_size_bytes: parse_env("MAX_UPLOAD_SIZE_BYTES", 500 * 1024 * 1024)?,
            upload_root: PathBuf::from(
                std::env::var("UPLOAD_ROOT").unwrap_or_else(|_| "data/uploads".into()),
            ),
            output_root: PathBuf::from(
                std::env::var("OUTPUT_ROOT").unwrap_or_else(|_| "data/output".into()),
            ),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "data/papermill.db".into()),
            stale_timeout_minutes: parse_env("STALE_TIMEOUT_MINUTES", 60)?,
            purge_retention_days: parse_env("PURGE_RETENTION_DAYS", 7)?,
            maintenance_reset_interval_minutes: parse_env(
                "MAINTENANCE_RESET_INTERVAL_MINUTES",
                5,
            )?,
            maintenance_purge_interval_hours: parse_env("MAINTENANCE_PURGE_INTERVAL_HOURS", 6)?,
            jwt: JwtConfig::from_env()?,
            api_keys: parse_api_keys(&std::env::var("API_KEYS").unwrap_or_default())?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| format!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

/// Parse `key:user_id:role` entries from the `API_KEYS` env var.
fn parse_api_keys(raw: &str) -> Result<Vec<ApiKeyEntry>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(user_id), Some(role))
                    if !key.is_empty() && !user_id.is_empty() && !role.is_empty() =>
                {
                    Ok(ApiKeyEntry {
                        key: key.to_string(),
                        user_id: user_id.to_string(),
                        role: role.to_string(),
                    })
                }
                _ => Err(format!(
                    "API_KEYS entry '{entry}' must have the form key:user_id:role"
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_parse_valid_entries() {
        let keys = parse_api_keys("abc:svc:admin, def:reporter:viewer").unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].key, "abc");
        assert_eq!(keys[0].user_id, "svc");
        assert_eq!(keys[0].role, "admin");
        assert_eq!(keys[1].role, "viewer");
    }

    #[test]
    fn api_keys_reject_malformed_entries() {
        assert!(parse_api_keys("justakey").is_err());
        assert!(parse_api_keys("key:user").is_err());
    }

    #[test]
    fn api_keys_empty_is_ok() {
        assert!(parse_api_keys("").unwrap().is_empty());
    }
}
