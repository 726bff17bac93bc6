//! Principal-resolving extractor for Axum handlers.
//!
//! Accepts either a Bearer JWT in the `Authorization` header or a static
//! service key in `X-API-Key`. Everything below the handler layer only
//! sees the resolved [`Principal`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use papermill_core::error::CoreError;
use papermill_core::principal::Principal;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated principal extracted from the request.
///
/// Use this as an extractor parameter in any handler that requires
/// authentication:
///
/// ```ignore
/// async fn my_handler(auth: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = %auth.principal.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub principal: Principal,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(api_key) = parts.headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
            let entry = state
                .config
                .api_keys
                .iter()
                .find(|entry| entry.key == api_key)
                .ok_or_else(|| {
                    AppError::Core(CoreError::Unauthorized("Invalid API key".into()))
                })?;
            return Ok(AuthUser {
                principal: Principal {
                    user_id: entry.user_id.clone(),
                    role: entry.role.clone(),
                },
            });
        }

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        Ok(AuthUser {
            principal: Principal {
                user_id: claims.sub,
                role: claims.role,
            },
        })
    }
}
