//! Route modules, one per resource, mounted under `/api/v1`.

use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod health;
pub mod queue;
pub mod tasks;

/// All API v1 routes. Health is also mounted here so clients that only
/// know the API base path can probe it.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/tasks", tasks::router())
        .nest("/queue", queue::router())
        .nest("/admin", admin::router())
        .merge(health::router())
}
