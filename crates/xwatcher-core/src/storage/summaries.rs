//! CRUD operations for summary records.

use super::{now_utc, DbPool};
use crate::error::StorageError;
use serde::Serialize;

/// A persisted bilingual summary for one tweet.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Summary {
    /// Summary id (UUID).
    pub summary_id: String,
    /// The tweet this summary belongs to (unique).
    pub tweet_id: String,
    /// Generated summary text (or the original text for short tweets).
    pub summary_text: String,
    /// Generated translation, if any.
    pub translation_text: Option<String>,
    /// Provider that produced the text ("openrouter", "minimax", …).
    pub model_provider: String,
    /// Model identifier.
    pub model_name: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: i64,
    /// Completion tokens produced.
    pub completion_tokens: i64,
    /// Total tokens (prompt + completion).
    pub total_tokens: i64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
    /// Whether this record was served from cache rather than a fresh call.
    pub cached: bool,
    /// False when the tweet was too short and the original text is reused.
    pub is_generated_summary: bool,
    /// SHA-256 of the canonical cache key.
    pub content_hash: String,
    /// Creation time, RFC 3339 UTC.
    pub created_at: String,
    /// Last update time, RFC 3339 UTC.
    pub updated_at: String,
}

/// Insert or replace the summary for a tweet.
///
/// A regeneration overwrites the previous record in place, keeping the
/// one-summary-per-tweet invariant.
pub async fn upsert_summary(pool: &DbPool, summary: &Summary) -> Result<(), StorageError> {
    let now = now_utc();
    let created_at = if summary.created_at.is_empty() {
        now.clone()
    } else {
        summary.created_at.clone()
    };

    sqlx::query(
        "INSERT INTO summaries \
         (summary_id, tweet_id, summary_text, translation_text, model_provider, \
          model_name, prompt_tokens, completion_tokens, total_tokens, cost_usd, \
          cached, is_generated_summary, content_hash, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(tweet_id) DO UPDATE SET \
           summary_text = excluded.summary_text, \
           translation_text = excluded.translation_text, \
           model_provider = excluded.model_provider, \
           model_name = excluded.model_name, \
           prompt_tokens = excluded.prompt_tokens, \
           completion_tokens = excluded.completion_tokens, \
           total_tokens = excluded.total_tokens, \
           cost_usd = excluded.cost_usd, \
           cached = excluded.cached, \
           is_generated_summary = excluded.is_generated_summary, \
           content_hash = excluded.content_hash, \
           updated_at = excluded.updated_at",
    )
    .bind(&summary.summary_id)
    .bind(&summary.tweet_id)
    .bind(&summary.summary_text)
    .bind(&summary.translation_text)
    .bind(&summary.model_provider)
    .bind(&summary.model_name)
    .bind(summary.prompt_tokens)
    .bind(summary.completion_tokens)
    .bind(summary.total_tokens)
    .bind(summary.cost_usd)
    .bind(summary.cached)
    .bind(summary.is_generated_summary)
    .bind(&summary.content_hash)
    .bind(&created_at)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}

/// Fetch the summary for a tweet. Returns `None` if not found.
pub async fn get_summary_by_tweet_id(
    pool: &DbPool,
    tweet_id: &str,
) -> Result<Option<Summary>, StorageError> {
    sqlx::query_as::<_, Summary>("SELECT * FROM summaries WHERE tweet_id = ?")
        .bind(tweet_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// Look up a persisted summary by content hash.
///
/// Warms the in-process cache after a restart: any member of a dedup group
/// shares its representative's hash.
pub async fn get_summary_by_content_hash(
    pool: &DbPool,
    content_hash: &str,
) -> Result<Option<Summary>, StorageError> {
    sqlx::query_as::<_, Summary>(
        "SELECT * FROM summaries WHERE content_hash = ? ORDER BY updated_at DESC LIMIT 1",
    )
    .bind(content_hash)
    .fetch_optional(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

/// Check if a summary exists for a tweet.
pub async fn summary_exists(pool: &DbPool, tweet_id: &str) -> Result<bool, StorageError> {
    let row: (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM summaries WHERE tweet_id = ?)")
        .bind(tweet_id)
        .fetch_one(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(row.0 == 1)
}

/// Aggregate cost and token usage for one provider.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProviderStats {
    /// Provider name.
    pub model_provider: String,
    /// Number of summary records.
    pub summary_count: i64,
    /// Total tokens across records.
    pub total_tokens: i64,
    /// Total estimated cost in USD.
    pub total_cost_usd: f64,
}

/// Aggregate cost/tokens per provider over an inclusive date range.
///
/// `start_date` and `end_date` are RFC 3339 timestamps or date prefixes;
/// either bound may be `None` to leave the range open.
pub async fn stats_by_provider(
    pool: &DbPool,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<Vec<ProviderStats>, StorageError> {
    sqlx::query_as::<_, ProviderStats>(
        "SELECT model_provider, \
                COUNT(*) AS summary_count, \
                COALESCE(SUM(total_tokens), 0) AS total_tokens, \
                COALESCE(SUM(cost_usd), 0.0) AS total_cost_usd \
         FROM summaries \
         WHERE (?1 IS NULL OR created_at >= ?1) \
           AND (?2 IS NULL OR created_at <= ?2) \
         GROUP BY model_provider \
         ORDER BY total_cost_usd DESC",
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;
    use crate::storage::tweets::{insert_tweets, sample_tweet};

    fn sample_summary(tweet_id: &str, provider: &str, tokens: i64, cost: f64) -> Summary {
        Summary {
            summary_id: format!("sum-{tweet_id}"),
            tweet_id: tweet_id.to_string(),
            summary_text: "总结".to_string(),
            translation_text: Some("translated".to_string()),
            model_provider: provider.to_string(),
            model_name: "test-model".to_string(),
            prompt_tokens: tokens / 2,
            completion_tokens: tokens - tokens / 2,
            total_tokens: tokens,
            cost_usd: cost,
            cached: false,
            is_generated_summary: true,
            content_hash: format!("hash-{tweet_id}"),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let pool = init_test_db().await.expect("init db");
        insert_tweets(&pool, &[sample_tweet("t1", "alice", "text")])
            .await
            .expect("seed");

        upsert_summary(&pool, &sample_summary("t1", "minimax", 100, 0.001))
            .await
            .expect("upsert");

        let fetched = get_summary_by_tweet_id(&pool, "t1")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(fetched.model_provider, "minimax");
        assert_eq!(fetched.total_tokens, 100);
        assert!(fetched.is_generated_summary);
    }

    #[tokio::test]
    async fn upsert_overwrites_existing() {
        let pool = init_test_db().await.expect("init db");
        insert_tweets(&pool, &[sample_tweet("t1", "alice", "text")])
            .await
            .expect("seed");

        upsert_summary(&pool, &sample_summary("t1", "openrouter", 100, 0.01))
            .await
            .expect("first");
        upsert_summary(&pool, &sample_summary("t1", "minimax", 50, 0.005))
            .await
            .expect("second");

        let fetched = get_summary_by_tweet_id(&pool, "t1")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(fetched.model_provider, "minimax");
        assert_eq!(fetched.total_tokens, 50);
    }

    #[tokio::test]
    async fn summary_deleted_with_tweet() {
        let pool = init_test_db().await.expect("init db");
        insert_tweets(&pool, &[sample_tweet("t1", "alice", "text")])
            .await
            .expect("seed");
        upsert_summary(&pool, &sample_summary("t1", "minimax", 10, 0.0))
            .await
            .expect("upsert");

        sqlx::query("DELETE FROM tweets WHERE tweet_id = 't1'")
            .execute(&pool)
            .await
            .expect("delete tweet");

        assert!(!summary_exists(&pool, "t1").await.expect("check"));
    }

    #[tokio::test]
    async fn stats_group_by_provider() {
        let pool = init_test_db().await.expect("init db");
        insert_tweets(
            &pool,
            &[
                sample_tweet("t1", "alice", "one"),
                sample_tweet("t2", "alice", "two"),
                sample_tweet("t3", "alice", "three"),
            ],
        )
        .await
        .expect("seed");

        upsert_summary(&pool, &sample_summary("t1", "openrouter", 100, 0.01))
            .await
            .expect("s1");
        upsert_summary(&pool, &sample_summary("t2", "openrouter", 200, 0.02))
            .await
            .expect("s2");
        upsert_summary(&pool, &sample_summary("t3", "minimax", 50, 0.001))
            .await
            .expect("s3");

        let stats = stats_by_provider(&pool, None, None).await.expect("stats");
        assert_eq!(stats.len(), 2);
        let openrouter = stats
            .iter()
            .find(|s| s.model_provider == "openrouter")
            .expect("openrouter row");
        assert_eq!(openrouter.summary_count, 2);
        assert_eq!(openrouter.total_tokens, 300);
        assert!((openrouter.total_cost_usd - 0.03).abs() < 1e-9);
    }

    #[tokio::test]
    async fn lookup_by_content_hash() {
        let pool = init_test_db().await.expect("init db");
        insert_tweets(&pool, &[sample_tweet("t1", "alice", "text")])
            .await
            .expect("seed");
        upsert_summary(&pool, &sample_summary("t1", "minimax", 10, 0.0))
            .await
            .expect("upsert");

        let found = get_summary_by_content_hash(&pool, "hash-t1")
            .await
            .expect("get");
        assert!(found.is_some());
        assert!(get_summary_by_content_hash(&pool, "hash-other")
            .await
            .expect("get")
            .is_none());
    }
}
