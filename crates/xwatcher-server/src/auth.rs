//! Multi-strategy authentication middleware.
//!
//! Checks in order:
//! 1. `X-API-Key` header equal to the bootstrap `ADMIN_API_KEY` → synthetic
//!    admin (id 0), valid for admin endpoints only
//! 2. `X-API-Key` header → SHA-256 lookup in the api_keys table, stamping
//!    `last_used_at` on a match
//! 3. `Authorization: Bearer <jwt>` → HS256 verification
//! 4. None of the above → 401
//!
//! The resolved [`AuthContext`] travels in request extensions.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use xwatcher_core::auth::{hash_api_key, verify_token};
use xwatcher_core::storage::{api_keys, users};

use crate::state::AppState;

/// The authenticated principal for one request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User id; 0 for the synthetic bootstrap admin.
    pub user_id: i64,
    /// Login email; empty for the synthetic admin.
    pub email: String,
    /// Whether admin endpoints are permitted.
    pub is_admin: bool,
    /// True for the bootstrap `ADMIN_API_KEY` principal, which is never
    /// valid on user-scoped endpoints.
    pub is_synthetic: bool,
}

impl AuthContext {
    fn synthetic_admin() -> Self {
        Self {
            user_id: 0,
            email: String::new(),
            is_admin: true,
            is_synthetic: true,
        }
    }
}

/// Routes exempt from authentication.
const AUTH_EXEMPT_PATHS: &[&str] = &["/health", "/metrics", "/api/auth/login"];

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({"detail": message})),
    )
        .into_response()
}

/// Axum middleware that enforces multi-strategy authentication.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();

    if AUTH_EXEMPT_PATHS.contains(&path) {
        return next.run(request).await;
    }

    // Strategy 1 + 2: API key header.
    if let Some(presented) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        let admin_key = &state.config.auth.admin_api_key;
        if !admin_key.is_empty() && presented == admin_key {
            request.extensions_mut().insert(AuthContext::synthetic_admin());
            return next.run(request).await;
        }

        let key_hash = hash_api_key(presented);
        match api_keys::find_and_touch_api_key(&state.db, &key_hash).await {
            Ok(Some(key)) => match users::get_user_by_id(&state.db, key.user_id).await {
                Ok(Some(user)) => {
                    request.extensions_mut().insert(AuthContext {
                        user_id: user.id,
                        email: user.email,
                        is_admin: user.is_admin,
                        is_synthetic: false,
                    });
                    return next.run(request).await;
                }
                Ok(None) => return unauthorized("api key owner no longer exists"),
                Err(e) => {
                    tracing::error!(error = %e, "user lookup failed");
                    return unauthorized("not authenticated");
                }
            },
            Ok(None) => return unauthorized("invalid api key"),
            Err(e) => {
                tracing::error!(error = %e, "api key lookup failed");
                return unauthorized("not authenticated");
            }
        }
    }

    // Strategy 3: Bearer JWT.
    if let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        match verify_token(token, &state.config.auth.jwt_secret) {
            Ok(claims) => {
                let user_id = claims.sub.parse::<i64>().unwrap_or(0);
                if user_id <= 0 {
                    return unauthorized("invalid token subject");
                }
                request.extensions_mut().insert(AuthContext {
                    user_id,
                    email: claims.email,
                    is_admin: claims.is_admin,
                    is_synthetic: false,
                });
                return next.run(request).await;
            }
            Err(_) => return unauthorized("invalid token"),
        }
    }

    unauthorized("not authenticated")
}

/// Guard: the principal must have admin rights.
pub fn require_admin(ctx: &AuthContext) -> Result<(), crate::error::ApiError> {
    if ctx.is_admin {
        Ok(())
    } else {
        Err(crate::error::ApiError::Forbidden(
            "admin privileges required".to_string(),
        ))
    }
}

/// Guard: the principal must be a real user (the bootstrap admin key is
/// never valid on user-scoped endpoints). Returns the user id.
pub fn require_real_user(ctx: &AuthContext) -> Result<i64, crate::error::ApiError> {
    if ctx.is_synthetic {
        Err(crate::error::ApiError::Forbidden(
            "bootstrap admin key cannot access user endpoints".to_string(),
        ))
    } else {
        Ok(ctx.user_id)
    }
}
