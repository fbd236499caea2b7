//! API key storage.
//!
//! Only the SHA-256 hash of a key is persisted; the plaintext is shown to
//! the user exactly once at creation time. The first eight characters are
//! kept as a display prefix.

use super::{now_utc, DbPool};
use crate::error::StorageError;
use serde::Serialize;

/// A stored API key (hash only).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApiKey {
    /// Row id.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// SHA-256 hex of the plaintext token. Never serialised to clients.
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// First 8 characters of the plaintext, for display.
    pub key_prefix: String,
    /// Optional label.
    pub name: Option<String>,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
    /// Last successful authentication, RFC 3339 UTC.
    pub last_used_at: Option<String>,
}

/// Store a new key hash for a user.
pub async fn insert_api_key(
    pool: &DbPool,
    user_id: i64,
    key_hash: &str,
    key_prefix: &str,
    name: Option<&str>,
) -> Result<ApiKey, StorageError> {
    let created_at = now_utc();
    let outcome = sqlx::query(
        "INSERT INTO api_keys (user_id, key_hash, key_prefix, name, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(key_hash)
    .bind(key_prefix)
    .bind(name)
    .bind(&created_at)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(ApiKey {
        id: outcome.last_insert_rowid(),
        user_id,
        key_hash: key_hash.to_string(),
        key_prefix: key_prefix.to_string(),
        name: name.map(str::to_string),
        created_at,
        last_used_at: None,
    })
}

/// Look up a key by hash and stamp `last_used_at` on a match.
pub async fn find_and_touch_api_key(
    pool: &DbPool,
    key_hash: &str,
) -> Result<Option<ApiKey>, StorageError> {
    let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = ?")
        .bind(key_hash)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    if let Some(ref key) = key {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(now_utc())
            .bind(key.id)
            .execute(pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;
    }

    Ok(key)
}

/// List a user's keys, newest first.
pub async fn list_api_keys(pool: &DbPool, user_id: i64) -> Result<Vec<ApiKey>, StorageError> {
    sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE user_id = ? ORDER BY id DESC")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// Delete one of a user's keys. Returns `false` if the key does not exist
/// or belongs to another user.
pub async fn delete_api_key(pool: &DbPool, user_id: i64, key_id: i64) -> Result<bool, StorageError> {
    let outcome = sqlx::query("DELETE FROM api_keys WHERE id = ? AND user_id = ?")
        .bind(key_id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(outcome.rows_affected() > 0)
}
