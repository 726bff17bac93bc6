//! Route definitions for admin maintenance. All endpoints require the
//! admin role (enforced by the `RequireAdmin` extractor in the handlers).

use axum::routing::post;
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// POST /queue/reset-stale -> reset_stale
/// POST /queue/cleanup     -> cleanup
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue/reset-stale", post(admin::reset_stale))
        .route("/queue/cleanup", post(admin::cleanup))
}
