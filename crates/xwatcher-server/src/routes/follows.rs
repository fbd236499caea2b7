//! Platform follow-list administration.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use xwatcher_core::scraper::is_valid_username;
use xwatcher_core::storage::follows;

use crate::auth::{require_admin, AuthContext};
use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for the follow list.
#[derive(Deserialize)]
pub struct ListFollowsQuery {
    /// Only return active follows.
    pub active_only: Option<bool>,
}

/// `GET /api/admin/scraping/follows` — list the platform follow list.
pub async fn list_follows(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListFollowsQuery>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;
    let items =
        follows::list_scraper_follows(&state.db, params.active_only.unwrap_or(false)).await?;
    let total = items.len();
    Ok(Json(json!({"follows": items, "total": total})))
}

/// Request body for adding a follow.
#[derive(Deserialize)]
pub struct AddFollowRequest {
    /// Username to follow (without @).
    pub username: String,
    /// Why this account is monitored.
    pub reason: Option<String>,
}

/// `POST /api/admin/scraping/follows` — add or reactivate a follow.
pub async fn add_follow(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<AddFollowRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_admin(&ctx)?;

    let username = body.username.trim().trim_start_matches('@').to_string();
    if !is_valid_username(&username) {
        return Err(ApiError::Unprocessable(format!(
            "invalid username: {username}"
        )));
    }

    if let Some(existing) = follows::get_scraper_follow(&state.db, &username).await? {
        if existing.is_active {
            return Err(ApiError::Conflict(format!(
                "@{username} is already followed"
            )));
        }
    }

    let added_by = if ctx.email.is_empty() {
        "admin".to_string()
    } else {
        ctx.email.clone()
    };
    follows::upsert_scraper_follow(&state.db, &username, body.reason.as_deref(), Some(&added_by))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"status": "added", "username": username})),
    ))
}

/// Request body for updating a follow.
#[derive(Deserialize)]
pub struct UpdateFollowRequest {
    /// New reason.
    pub reason: Option<String>,
    /// New active flag.
    pub is_active: Option<bool>,
}

/// `PUT /api/admin/scraping/follows/{username}` — update a follow.
pub async fn update_follow(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(username): Path<String>,
    Json(body): Json<UpdateFollowRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;

    let updated =
        follows::update_scraper_follow(&state.db, &username, body.reason.as_deref(), body.is_active)
            .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("follow not found: @{username}")));
    }
    Ok(Json(json!({"status": "updated", "username": username})))
}

/// `DELETE /api/admin/scraping/follows/{username}` — soft-delete (204).
pub async fn remove_follow(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_admin(&ctx)?;

    let removed = follows::deactivate_scraper_follow(&state.db, &username).await?;
    if !removed {
        return Err(ApiError::NotFound(format!(
            "active follow not found: @{username}"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
