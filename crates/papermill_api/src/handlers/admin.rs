//! Admin maintenance handlers: stale-task reset and retention cleanup.
//!
//! Both run on a schedule in the background loop; these endpoints let an
//! operator trigger them on demand with explicit thresholds.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::state::AppState;

/// Request body for POST /admin/queue/reset-stale.
#[derive(Debug, Deserialize)]
pub struct ResetStaleRequest {
    /// Claims older than this are presumed abandoned. Defaults to the
    /// configured stale timeout.
    pub timeout_minutes: Option<i64>,
}

/// Response for POST /admin/queue/reset-stale.
#[derive(Debug, Serialize)]
pub struct ResetStaleResponse {
    pub reset_count: u64,
}

/// Request body for POST /admin/queue/cleanup.
#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    /// Terminal tasks older than this are deleted. Defaults to the
    /// configured retention.
    pub retention_days: Option<i64>,
}

/// Response for POST /admin/queue/cleanup.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted_count: u64,
}

/// POST /api/v1/admin/queue/reset-stale
///
/// Requeue (or fail, once out of retries) tasks stuck in `processing`
/// longer than the timeout. Admin only.
pub async fn reset_stale(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<ResetStaleRequest>,
) -> AppResult<impl IntoResponse> {
    let timeout_minutes = input
        .timeout_minutes
        .unwrap_or(state.config.stale_timeout_minutes);
    if timeout_minutes <= 0 {
        return Err(AppError::BadRequest(
            "timeout_minutes must be positive".into(),
        ));
    }

    let reset_count = state
        .queue
        .reset_stale(chrono::Duration::minutes(timeout_minutes))
        .await?;

    tracing::info!(
        reset_count,
        timeout_minutes,
        admin_id = %admin.principal.user_id,
        "Stale tasks reset by admin",
    );

    Ok(Json(ResetStaleResponse { reset_count }))
}

/// POST /api/v1/admin/queue/cleanup
///
/// Delete terminal tasks older than the retention period together with
/// their artifact directories. Admin only.
pub async fn cleanup(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CleanupRequest>,
) -> AppResult<impl IntoResponse> {
    let retention_days = input
        .retention_days
        .unwrap_or(state.config.purge_retention_days);
    if retention_days <= 0 {
        return Err(AppError::BadRequest(
            "retention_days must be positive".into(),
        ));
    }

    let deleted_count = state
        .queue
        .purge_old(chrono::Duration::days(retention_days))
        .await?;

    tracing::info!(
        deleted_count,
        retention_days,
        admin_id = %admin.principal.user_id,
        "Old tasks purged by admin",
    );

    Ok(Json(CleanupResponse { deleted_count }))
}
