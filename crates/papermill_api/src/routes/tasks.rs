//! Route definitions for the `/tasks` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// POST   /submit    -> submit_task
/// GET    /{id}      -> get_task
/// DELETE /{id}      -> cancel_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submit", post(tasks::submit_task))
        .route("/{id}", get(tasks::get_task).delete(tasks::cancel_task))
}
