//! Follow lists: platform-wide scraper follows and per-user follows.

use super::{now_utc, DbPool};
use crate::error::StorageError;
use serde::Serialize;

/// A username on the platform-wide scrape list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ScraperFollow {
    /// The followed @handle (unique).
    pub username: String,
    /// Why this account is monitored.
    pub reason: Option<String>,
    /// Who added it.
    pub added_by: Option<String>,
    /// When it was added, RFC 3339 UTC.
    pub added_at: String,
    /// Soft-delete flag.
    pub is_active: bool,
}

/// Add a scraper follow, or reactivate a soft-deleted one.
pub async fn upsert_scraper_follow(
    pool: &DbPool,
    username: &str,
    reason: Option<&str>,
    added_by: Option<&str>,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO scraper_follows (username, reason, added_by, added_at, is_active) \
         VALUES (?, ?, ?, ?, 1) \
         ON CONFLICT(username) DO UPDATE SET \
           reason = excluded.reason, \
           added_by = excluded.added_by, \
           is_active = 1",
    )
    .bind(username)
    .bind(reason)
    .bind(added_by)
    .bind(now_utc())
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}

/// Update the reason/active flag of an existing follow.
///
/// Returns `false` if the username is not on the list.
pub async fn update_scraper_follow(
    pool: &DbPool,
    username: &str,
    reason: Option<&str>,
    is_active: Option<bool>,
) -> Result<bool, StorageError> {
    let outcome = sqlx::query(
        "UPDATE scraper_follows SET \
           reason = COALESCE(?, reason), \
           is_active = COALESCE(?, is_active) \
         WHERE username = ?",
    )
    .bind(reason)
    .bind(is_active)
    .bind(username)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(outcome.rows_affected() > 0)
}

/// Soft-delete a follow. Returns `false` if not found or already inactive.
pub async fn deactivate_scraper_follow(
    pool: &DbPool,
    username: &str,
) -> Result<bool, StorageError> {
    let outcome =
        sqlx::query("UPDATE scraper_follows SET is_active = 0 WHERE username = ? AND is_active = 1")
            .bind(username)
            .execute(pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;

    Ok(outcome.rows_affected() > 0)
}

/// Fetch one follow by username.
pub async fn get_scraper_follow(
    pool: &DbPool,
    username: &str,
) -> Result<Option<ScraperFollow>, StorageError> {
    sqlx::query_as::<_, ScraperFollow>("SELECT * FROM scraper_follows WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// List follows, optionally restricted to active ones.
pub async fn list_scraper_follows(
    pool: &DbPool,
    active_only: bool,
) -> Result<Vec<ScraperFollow>, StorageError> {
    let sql = if active_only {
        "SELECT * FROM scraper_follows WHERE is_active = 1 ORDER BY username"
    } else {
        "SELECT * FROM scraper_follows ORDER BY username"
    };
    sqlx::query_as::<_, ScraperFollow>(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// List just the active usernames (the scheduler's scrape set).
pub async fn active_usernames(pool: &DbPool) -> Result<Vec<String>, StorageError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT username FROM scraper_follows WHERE is_active = 1 ORDER BY username")
            .fetch_all(pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// A per-user follow, always a subset of the active scraper follows.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserFollow {
    /// Row id.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Followed @handle.
    pub username: String,
    /// Display priority, 1..=10.
    pub priority: i64,
    /// When it was added, RFC 3339 UTC.
    pub created_at: String,
}

/// Add a follow for a user.
///
/// Fails with `Query` on duplicate `(user_id, username)`. Callers enforce
/// the active-scraper-follow invariant before inserting.
pub async fn insert_user_follow(
    pool: &DbPool,
    user_id: i64,
    username: &str,
    priority: i64,
) -> Result<UserFollow, StorageError> {
    let created_at = now_utc();
    let outcome = sqlx::query(
        "INSERT INTO twitter_follows (user_id, username, priority, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(username)
    .bind(priority)
    .bind(&created_at)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(UserFollow {
        id: outcome.last_insert_rowid(),
        user_id,
        username: username.to_string(),
        priority,
        created_at,
    })
}

/// List a user's follows ordered by priority (highest first).
pub async fn list_user_follows(
    pool: &DbPool,
    user_id: i64,
) -> Result<Vec<UserFollow>, StorageError> {
    sqlx::query_as::<_, UserFollow>(
        "SELECT * FROM twitter_follows WHERE user_id = ? ORDER BY priority DESC, username",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

/// Remove a user's follow. Returns `false` if not found.
pub async fn delete_user_follow(
    pool: &DbPool,
    user_id: i64,
    username: &str,
) -> Result<bool, StorageError> {
    let outcome = sqlx::query("DELETE FROM twitter_follows WHERE user_id = ? AND username = ?")
        .bind(user_id)
        .bind(username)
        .execute(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(outcome.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;
    use crate::storage::users::create_user;

    #[tokio::test]
    async fn upsert_and_list_active() {
        let pool = init_test_db().await.expect("init db");

        upsert_scraper_follow(&pool, "alice", Some("AI news"), Some("admin"))
            .await
            .expect("add");
        upsert_scraper_follow(&pool, "bob", None, None)
            .await
            .expect("add");

        let active = active_usernames(&pool).await.expect("list");
        assert_eq!(active, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn deactivate_is_soft_delete() {
        let pool = init_test_db().await.expect("init db");
        upsert_scraper_follow(&pool, "alice", None, None)
            .await
            .expect("add");

        assert!(deactivate_scraper_follow(&pool, "alice").await.expect("deactivate"));
        // Second deactivation is a no-op.
        assert!(!deactivate_scraper_follow(&pool, "alice").await.expect("deactivate"));

        assert!(active_usernames(&pool).await.expect("list").is_empty());
        // The row itself survives.
        let follow = get_scraper_follow(&pool, "alice")
            .await
            .expect("get")
            .expect("exists");
        assert!(!follow.is_active);
    }

    #[tokio::test]
    async fn upsert_reactivates() {
        let pool = init_test_db().await.expect("init db");
        upsert_scraper_follow(&pool, "alice", None, None)
            .await
            .expect("add");
        deactivate_scraper_follow(&pool, "alice")
            .await
            .expect("deactivate");

        upsert_scraper_follow(&pool, "alice", Some("back again"), None)
            .await
            .expect("re-add");
        assert_eq!(active_usernames(&pool).await.expect("list"), vec!["alice"]);
    }

    #[tokio::test]
    async fn user_follow_lifecycle() {
        let pool = init_test_db().await.expect("init db");
        let user = create_user(&pool, "u@example.com", "hash", false)
            .await
            .expect("user");

        insert_user_follow(&pool, user.id, "alice", 8)
            .await
            .expect("follow");
        insert_user_follow(&pool, user.id, "bob", 3)
            .await
            .expect("follow");

        let follows = list_user_follows(&pool, user.id).await.expect("list");
        assert_eq!(follows.len(), 2);
        assert_eq!(follows[0].username, "alice");

        assert!(delete_user_follow(&pool, user.id, "bob").await.expect("delete"));
        assert!(!delete_user_follow(&pool, user.id, "bob").await.expect("delete"));
    }

    #[tokio::test]
    async fn duplicate_user_follow_rejected() {
        let pool = init_test_db().await.expect("init db");
        let user = create_user(&pool, "u@example.com", "hash", false)
            .await
            .expect("user");

        insert_user_follow(&pool, user.id, "alice", 5)
            .await
            .expect("first");
        assert!(insert_user_follow(&pool, user.id, "alice", 5).await.is_err());
    }
}
