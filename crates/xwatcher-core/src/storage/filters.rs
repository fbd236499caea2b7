//! Per-user filter rules.

use super::{now_utc, DbPool};
use crate::config::defaults::MAX_FILTER_RULES_PER_USER;
use crate::error::StorageError;
use serde::Serialize;

/// Allowed filter rule types.
pub const FILTER_TYPES: &[&str] = &["keyword", "hashtag", "content_type"];

/// A per-user feed filter rule.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FilterRule {
    /// Row id.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// One of "keyword", "hashtag", "content_type".
    pub filter_type: String,
    /// The filter value.
    pub value: String,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
}

/// Outcome of an insert attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum FilterInsertOutcome {
    /// Rule stored.
    Inserted(i64),
    /// Identical rule already exists for this user.
    Duplicate,
    /// The user already has the maximum number of rules.
    LimitReached,
}

/// Add a filter rule, enforcing the per-user cap and uniqueness.
pub async fn insert_filter_rule(
    pool: &DbPool,
    user_id: i64,
    filter_type: &str,
    value: &str,
) -> Result<FilterInsertOutcome, StorageError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM filter_rules WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    if count.0 >= MAX_FILTER_RULES_PER_USER {
        return Ok(FilterInsertOutcome::LimitReached);
    }

    let outcome = sqlx::query(
        "INSERT OR IGNORE INTO filter_rules (user_id, filter_type, value, created_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(filter_type)
    .bind(value)
    .bind(now_utc())
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    if outcome.rows_affected() == 0 {
        Ok(FilterInsertOutcome::Duplicate)
    } else {
        Ok(FilterInsertOutcome::Inserted(outcome.last_insert_rowid()))
    }
}

/// List a user's filter rules.
pub async fn list_filter_rules(
    pool: &DbPool,
    user_id: i64,
) -> Result<Vec<FilterRule>, StorageError> {
    sqlx::query_as::<_, FilterRule>(
        "SELECT * FROM filter_rules WHERE user_id = ? ORDER BY filter_type, value",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

/// Delete one of a user's rules. Returns `false` if not found.
pub async fn delete_filter_rule(
    pool: &DbPool,
    user_id: i64,
    rule_id: i64,
) -> Result<bool, StorageError> {
    let outcome = sqlx::query("DELETE FROM filter_rules WHERE id = ? AND user_id = ?")
        .bind(rule_id)
        .bind(user_id)
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
    async fn insert_list_delete() {
        let pool = init_test_db().await.expect("init db");
        let user = create_user(&pool, "a@example.com", "hash", false)
            .await
            .expect("user");

        let outcome = insert_filter_rule(&pool, user.id, "keyword", "rust")
            .await
            .expect("insert");
        let rule_id = match outcome {
            FilterInsertOutcome::Inserted(id) => id,
            other => panic!("expected Inserted, got {other:?}"),
        };

        let rules = list_filter_rules(&pool, user.id).await.expect("list");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].value, "rust");

        assert!(delete_filter_rule(&pool, user.id, rule_id).await.expect("delete"));
        assert!(list_filter_rules(&pool, user.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn duplicate_rule_reported() {
        let pool = init_test_db().await.expect("init db");
        let user = create_user(&pool, "a@example.com", "hash", false)
            .await
            .expect("user");

        insert_filter_rule(&pool, user.id, "hashtag", "ai")
            .await
            .expect("first");
        let outcome = insert_filter_rule(&pool, user.id, "hashtag", "ai")
            .await
            .expect("second");
        assert_eq!(outcome, FilterInsertOutcome::Duplicate);
    }

    #[tokio::test]
    async fn cap_enforced() {
        let pool = init_test_db().await.expect("init db");
        let user = create_user(&pool, "a@example.com", "hash", false)
            .await
            .expect("user");

        for i in 0..MAX_FILTER_RULES_PER_USER {
            let outcome = insert_filter_rule(&pool, user.id, "keyword", &format!("kw{i}"))
                .await
                .expect("insert");
            assert!(matches!(outcome, FilterInsertOutcome::Inserted(_)));
        }

        let outcome = insert_filter_rule(&pool, user.id, "keyword", "one-too-many")
            .await
            .expect("insert");
        assert_eq!(outcome, FilterInsertOutcome::LimitReached);
    }
}
