//! CRUD operations for dedup groups.
//!
//! Groups and their member back-references always change together inside
//! one transaction, so a reader never observes a tweet pointing at a group
//! that doesn't list it (or vice versa).

use super::{now_utc, DbPool};
use crate::error::StorageError;
use serde::Serialize;

/// Exact-duplicate group type discriminator.
pub const DEDUP_TYPE_EXACT: &str = "exact_duplicate";

/// Similar-content group type discriminator.
pub const DEDUP_TYPE_SIMILAR: &str = "similar_content";

/// A persisted group of duplicate or similar tweets.
#[derive(Debug, Clone, Serialize)]
pub struct DedupGroup {
    /// Group id (UUID).
    pub group_id: String,
    /// The earliest-created member; ties broken by smallest tweet id.
    pub representative_tweet_id: String,
    /// "exact_duplicate" or "similar_content".
    pub dedup_type: String,
    /// Minimum pairwise similarity within the cluster; only for similar groups.
    pub similarity_score: Option<f64>,
    /// Member tweet ids (unordered).
    pub tweet_ids: Vec<String>,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    group_id: String,
    representative_tweet_id: String,
    dedup_type: String,
    similarity_score: Option<f64>,
    tweet_ids: String,
    created_at: String,
}

impl GroupRow {
    fn into_group(self) -> Result<DedupGroup, StorageError> {
        let tweet_ids =
            serde_json::from_str(&self.tweet_ids).map_err(|e| StorageError::Decode {
                message: format!("invalid tweet_ids JSON: {e}"),
            })?;
        Ok(DedupGroup {
            group_id: self.group_id,
            representative_tweet_id: self.representative_tweet_id,
            dedup_type: self.dedup_type,
            similarity_score: self.similarity_score,
            tweet_ids,
            created_at: self.created_at,
        })
    }
}

/// Insert a set of groups and set each member's back-reference, atomically.
pub async fn insert_groups(pool: &DbPool, groups: &[DedupGroup]) -> Result<(), StorageError> {
    if groups.is_empty() {
        return Ok(());
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    for group in groups {
        let created_at = if group.created_at.is_empty() {
            now_utc()
        } else {
            group.created_at.clone()
        };
        let member_json =
            serde_json::to_string(&group.tweet_ids).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            "INSERT INTO dedup_groups \
             (group_id, representative_tweet_id, dedup_type, similarity_score, tweet_ids, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&group.group_id)
        .bind(&group.representative_tweet_id)
        .bind(&group.dedup_type)
        .bind(group.similarity_score)
        .bind(&member_json)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

        for tweet_id in &group.tweet_ids {
            sqlx::query("UPDATE tweets SET dedup_group_id = ? WHERE tweet_id = ?")
                .bind(&group.group_id)
                .bind(tweet_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Query { source: e })?;
        }
    }

    tx.commit()
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// Fetch a group by id. Returns `None` if not found.
pub async fn get_group(pool: &DbPool, group_id: &str) -> Result<Option<DedupGroup>, StorageError> {
    let row = sqlx::query_as::<_, GroupRow>("SELECT * FROM dedup_groups WHERE group_id = ?")
        .bind(group_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    row.map(GroupRow::into_group).transpose()
}

/// Delete a group and clear every member's back-reference, atomically.
///
/// Returns `false` if the group did not exist.
pub async fn delete_group(pool: &DbPool, group_id: &str) -> Result<bool, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    sqlx::query("UPDATE tweets SET dedup_group_id = NULL WHERE dedup_group_id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    let outcome = sqlx::query("DELETE FROM dedup_groups WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    tx.commit()
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(outcome.rows_affected() > 0)
}

/// Delete every group that has a member among `tweet_ids`, clearing
/// back-references. Used by force-refresh deduplication.
pub async fn delete_groups_for_tweets(
    pool: &DbPool,
    tweet_ids: &[String],
) -> Result<u64, StorageError> {
    if tweet_ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; tweet_ids.len()].join(", ");
    let sql = format!(
        "SELECT DISTINCT dedup_group_id FROM tweets \
         WHERE dedup_group_id IS NOT NULL AND tweet_id IN ({placeholders})"
    );
    let mut query = sqlx::query_as::<_, (String,)>(&sql);
    for id in tweet_ids {
        query = query.bind(id);
    }
    let group_ids: Vec<(String,)> = query
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    let mut deleted = 0;
    for (group_id,) in group_ids {
        if delete_group(pool, &group_id).await? {
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;
    use crate::storage::tweets::{get_tweet_by_id, insert_tweets, sample_tweet};

    async fn seed_tweets(pool: &DbPool, ids: &[&str]) {
        let tweets: Vec<_> = ids
            .iter()
            .map(|id| sample_tweet(id, "alice", &format!("text {id}")))
            .collect();
        insert_tweets(pool, &tweets).await.expect("seed");
    }

    fn sample_group(group_id: &str, representative: &str, members: &[&str]) -> DedupGroup {
        DedupGroup {
            group_id: group_id.to_string(),
            representative_tweet_id: representative.to_string(),
            dedup_type: DEDUP_TYPE_EXACT.to_string(),
            similarity_score: None,
            tweet_ids: members.iter().map(|s| s.to_string()).collect(),
            created_at: String::new(),
        }
    }

    #[tokio::test]
    async fn insert_sets_back_references() {
        let pool = init_test_db().await.expect("init db");
        seed_tweets(&pool, &["t1", "t2"]).await;

        let group = sample_group("g1", "t1", &["t1", "t2"]);
        insert_groups(&pool, &[group]).await.expect("insert");

        let t1 = get_tweet_by_id(&pool, "t1").await.expect("get").unwrap();
        let t2 = get_tweet_by_id(&pool, "t2").await.expect("get").unwrap();
        assert_eq!(t1.dedup_group_id.as_deref(), Some("g1"));
        assert_eq!(t2.dedup_group_id.as_deref(), Some("g1"));

        let stored = get_group(&pool, "g1").await.expect("get").expect("exists");
        assert_eq!(stored.tweet_ids.len(), 2);
        assert_eq!(stored.representative_tweet_id, "t1");
    }

    #[tokio::test]
    async fn delete_clears_back_references() {
        let pool = init_test_db().await.expect("init db");
        seed_tweets(&pool, &["t1", "t2"]).await;
        insert_groups(&pool, &[sample_group("g1", "t1", &["t1", "t2"])])
            .await
            .expect("insert");

        let removed = delete_group(&pool, "g1").await.expect("delete");
        assert!(removed);

        let t1 = get_tweet_by_id(&pool, "t1").await.expect("get").unwrap();
        assert!(t1.dedup_group_id.is_none());
        assert!(get_group(&pool, "g1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn delete_missing_group_returns_false() {
        let pool = init_test_db().await.expect("init db");
        assert!(!delete_group(&pool, "nope").await.expect("delete"));
    }

    #[tokio::test]
    async fn delete_groups_for_tweets_removes_affected() {
        let pool = init_test_db().await.expect("init db");
        seed_tweets(&pool, &["t1", "t2", "t3", "t4"]).await;
        insert_groups(
            &pool,
            &[
                sample_group("g1", "t1", &["t1", "t2"]),
                sample_group("g2", "t3", &["t3", "t4"]),
            ],
        )
        .await
        .expect("insert");

        // Only g1 contains t2; g2 must survive.
        let deleted = delete_groups_for_tweets(&pool, &["t2".to_string()])
            .await
            .expect("delete");
        assert_eq!(deleted, 1);
        assert!(get_group(&pool, "g1").await.expect("get").is_none());
        assert!(get_group(&pool, "g2").await.expect("get").is_some());
    }
}
