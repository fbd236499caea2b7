//! User lifecycle and self-service endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use xwatcher_core::auth::{generate_api_key, hash_password, verify_password};
use xwatcher_core::scraper::is_valid_username;
use xwatcher_core::storage::filters::FilterInsertOutcome;
use xwatcher_core::storage::{api_keys, filters, follows, users};

use crate::auth::{require_admin, require_real_user, AuthContext};
use crate::error::ApiError;
use crate::state::AppState;

/// Minimum accepted password length.
const MIN_PASSWORD_CHARS: usize = 8;

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::Unprocessable(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

// ---- Admin user management ----

/// Request body for creating a user.
#[derive(Deserialize)]
pub struct CreateUserRequest {
    /// Login email (unique).
    pub email: String,
    /// Initial password.
    pub password: String,
    /// Grant admin rights.
    #[serde(default)]
    pub is_admin: bool,
}

/// `POST /api/admin/users` — create a user.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_admin(&ctx)?;

    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Unprocessable("invalid email".to_string()));
    }
    validate_password(&body.password)?;

    if users::get_user_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict(format!("email already in use: {email}")));
    }

    let password_hash = hash_password(&body.password)?;
    let user = users::create_user(&state.db, &email, &password_hash, body.is_admin).await?;

    Ok((StatusCode::CREATED, Json(json!(user))))
}

/// `GET /api/admin/users` — list users.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;
    let items = users::list_users(&state.db).await?;
    let total = items.len();
    Ok(Json(json!({"users": items, "total": total})))
}

/// Request body for a password reset.
#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    /// The new password.
    pub new_password: String,
}

/// `POST /api/admin/users/{id}/reset-password` — set a user's password.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<i64>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx)?;
    validate_password(&body.new_password)?;

    let password_hash = hash_password(&body.new_password)?;
    let updated = users::update_password_hash(&state.db, user_id, &password_hash).await?;
    if !updated {
        return Err(ApiError::NotFound(format!("user not found: {user_id}")));
    }
    Ok(Json(json!({"status": "password_reset", "user_id": user_id})))
}

// ---- Self-service ----

/// `GET /api/users/me` — the authenticated user's profile.
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let user_id = require_real_user(&ctx)?;
    let user = users::get_user_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user no longer exists".to_string()))?;
    Ok(Json(json!(user)))
}

/// Request body for a self-service password change.
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    /// The current password, for confirmation.
    pub current_password: String,
    /// The new password.
    pub new_password: String,
}

/// `PUT /api/users/me/password` — change own password.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = require_real_user(&ctx)?;
    validate_password(&body.new_password)?;

    let user = users::get_user_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user no longer exists".to_string()))?;

    if !verify_password(&body.current_password, &user.password_hash)? {
        return Err(ApiError::Forbidden("current password is wrong".to_string()));
    }

    let password_hash = hash_password(&body.new_password)?;
    users::update_password_hash(&state.db, user_id, &password_hash).await?;
    Ok(Json(json!({"status": "password_changed"})))
}

/// Request body for creating an API key.
#[derive(Deserialize, Default)]
pub struct CreateApiKeyRequest {
    /// Optional label.
    pub name: Option<String>,
}

/// `POST /api/users/me/api-keys` — issue a key; the plaintext is returned
/// exactly once. Send `{}` for an unnamed key.
pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = require_real_user(&ctx)?;
    let name = body.name;

    let issued = generate_api_key();
    let stored = api_keys::insert_api_key(
        &state.db,
        user_id,
        &issued.key_hash,
        &issued.key_prefix,
        name.as_deref(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": stored.id,
            "api_key": issued.plaintext,
            "key_prefix": stored.key_prefix,
            "name": stored.name,
            "created_at": stored.created_at,
        })),
    ))
}

/// `GET /api/users/me/api-keys` — list own keys (prefixes only).
pub async fn list_own_api_keys(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let user_id = require_real_user(&ctx)?;
    let items = api_keys::list_api_keys(&state.db, user_id).await?;
    let total = items.len();
    Ok(Json(json!({"api_keys": items, "total": total})))
}

/// `DELETE /api/users/me/api-keys/{id}` — revoke a key (204).
pub async fn delete_own_api_key(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(key_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let user_id = require_real_user(&ctx)?;
    let removed = api_keys::delete_api_key(&state.db, user_id, key_id).await?;
    if !removed {
        return Err(ApiError::NotFound(format!("api key not found: {key_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---- Per-user follows ----

/// Request body for adding a user follow.
#[derive(Deserialize)]
pub struct AddUserFollowRequest {
    /// Username to follow; must be an active scraper follow.
    pub username: String,
    /// Display priority, 1..=10 (default 5).
    pub priority: Option<i64>,
}

/// `POST /api/users/me/follows` — follow an account.
pub async fn add_user_follow(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<AddUserFollowRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = require_real_user(&ctx)?;

    let username = body.username.trim().trim_start_matches('@').to_string();
    if !is_valid_username(&username) {
        return Err(ApiError::Unprocessable(format!(
            "invalid username: {username}"
        )));
    }

    let priority = body.priority.unwrap_or(5);
    if !(1..=10).contains(&priority) {
        return Err(ApiError::Unprocessable(format!(
            "priority must be in 1..=10, got {priority}"
        )));
    }

    // A user follow must reference an active platform follow.
    let active = follows::get_scraper_follow(&state.db, &username)
        .await?
        .map(|f| f.is_active)
        .unwrap_or(false);
    if !active {
        return Err(ApiError::Unprocessable(format!(
            "@{username} is not on the active scraper follow list"
        )));
    }

    if follows::list_user_follows(&state.db, user_id)
        .await?
        .iter()
        .any(|f| f.username == username)
    {
        return Err(ApiError::Conflict(format!(
            "already following @{username}"
        )));
    }

    let follow = follows::insert_user_follow(&state.db, user_id, &username, priority).await?;
    Ok((StatusCode::CREATED, Json(json!(follow))))
}

/// `GET /api/users/me/follows` — list own follows.
pub async fn list_own_follows(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let user_id = require_real_user(&ctx)?;
    let items = follows::list_user_follows(&state.db, user_id).await?;
    let total = items.len();
    Ok(Json(json!({"follows": items, "total": total})))
}

/// `DELETE /api/users/me/follows/{username}` — unfollow (204).
pub async fn delete_own_follow(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = require_real_user(&ctx)?;
    let removed = follows::delete_user_follow(&state.db, user_id, &username).await?;
    if !removed {
        return Err(ApiError::NotFound(format!("not following @{username}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---- Per-user filter rules ----

/// Request body for adding a filter rule.
#[derive(Deserialize)]
pub struct AddFilterRequest {
    /// One of "keyword", "hashtag", "content_type".
    pub filter_type: String,
    /// The filter value.
    pub value: String,
}

/// `POST /api/users/me/filters` — add a filter rule.
pub async fn add_filter(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<AddFilterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = require_real_user(&ctx)?;

    if !filters::FILTER_TYPES.contains(&body.filter_type.as_str()) {
        return Err(ApiError::Unprocessable(format!(
            "unknown filter_type: {}",
            body.filter_type
        )));
    }
    let value = body.value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest("value is required".to_string()));
    }

    match filters::insert_filter_rule(&state.db, user_id, &body.filter_type, value).await? {
        FilterInsertOutcome::Inserted(id) => Ok((
            StatusCode::CREATED,
            Json(json!({"id": id, "filter_type": body.filter_type, "value": value})),
        )),
        FilterInsertOutcome::Duplicate => Err(ApiError::Conflict(
            "identical filter rule already exists".to_string(),
        )),
        FilterInsertOutcome::LimitReached => Err(ApiError::Unprocessable(
            "filter rule limit reached".to_string(),
        )),
    }
}

/// `GET /api/users/me/filters` — list own filter rules.
pub async fn list_filters(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let user_id = require_real_user(&ctx)?;
    let items = filters::list_filter_rules(&state.db, user_id).await?;
    let total = items.len();
    Ok(Json(json!({"filters": items, "total": total})))
}

/// `DELETE /api/users/me/filters/{id}` — remove a filter rule (204).
pub async fn delete_filter(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(rule_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let user_id = require_real_user(&ctx)?;
    let removed = filters::delete_filter_rule(&state.db, user_id, rule_id).await?;
    if !removed {
        return Err(ApiError::NotFound(format!(
            "filter rule not found: {rule_id}"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
