//! Login endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use xwatcher_core::auth::{issue_token, verify_password};
use xwatcher_core::storage::users;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for login.
#[derive(Deserialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// `POST /api/auth/login` — exchange credentials for a bearer token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = users::get_user_by_email(&state.db, &body.email)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::Unauthorized("invalid credentials".to_string()))?;

    let matches = verify_password(&body.password, &user.password_hash)?;
    if !matches {
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    let token = issue_token(
        user.id,
        &user.email,
        user.is_admin,
        &state.config.auth.jwt_secret,
        state.config.auth.jwt_expire_hours,
    )?;

    Ok(Json(json!({
        "access_token": token,
        "token_type": "bearer",
    })))
}
