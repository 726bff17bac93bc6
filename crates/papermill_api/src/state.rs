use std::sync::Arc;

use papermill_db::queue::QueueService;
use papermill_db::DbPool;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (health checks).
    pub pool: DbPool,
    /// Queue service carrying the upload/output roots.
    pub queue: QueueService,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
