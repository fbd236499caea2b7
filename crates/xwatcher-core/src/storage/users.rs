//! User account storage.

use super::{now_utc, DbPool};
use crate::error::StorageError;
use serde::Serialize;

/// A registered user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    /// Row id.
    pub id: i64,
    /// Login email (unique).
    pub email: String,
    /// Bcrypt hash of the password. Never serialised to clients.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Whether the user may access admin endpoints.
    pub is_admin: bool,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
}

/// Create a user. Fails with a query error on duplicate email; callers
/// should check [`get_user_by_email`] first to return a clean conflict.
pub async fn create_user(
    pool: &DbPool,
    email: &str,
    password_hash: &str,
    is_admin: bool,
) -> Result<User, StorageError> {
    let created_at = now_utc();
    let outcome = sqlx::query(
        "INSERT INTO users (email, password_hash, is_admin, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(email)
    .bind(password_hash)
    .bind(is_admin)
    .bind(&created_at)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(User {
        id: outcome.last_insert_rowid(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        is_admin,
        created_at,
    })
}

/// Look up a user by email.
pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, StorageError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// Look up a user by id.
pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<User>, StorageError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// List all users, oldest first.
pub async fn list_users(pool: &DbPool) -> Result<Vec<User>, StorageError> {
    sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// Replace a user's password hash. Returns `false` if the user is unknown.
pub async fn update_password_hash(
    pool: &DbPool,
    user_id: i64,
    password_hash: &str,
) -> Result<bool, StorageError> {
    let outcome = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(outcome.rows_affected() > 0)
}
