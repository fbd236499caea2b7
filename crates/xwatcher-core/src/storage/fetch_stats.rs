//! Per-username fetch statistics driving adaptive fetch sizing.

use super::{now_utc, DbPool};
use crate::error::StorageError;
use serde::Serialize;

/// Running counters for one username.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FetchStats {
    /// The @handle these stats describe (primary key).
    pub username: String,
    /// When the last fetch completed, RFC 3339 UTC.
    pub last_fetch_at: Option<String>,
    /// Tweets returned by the last fetch.
    pub last_fetched_count: i64,
    /// New (previously unseen) tweets in the last fetch.
    pub last_new_count: i64,
    /// Total fetches ever performed.
    pub total_fetches: i64,
    /// EMA of new/fetched, in [0, 1].
    pub avg_new_rate: f64,
    /// Consecutive fetches that yielded zero new tweets.
    pub consecutive_empty_fetches: i64,
}

/// Fetch stats for a username. Returns `None` for a first-time username.
pub async fn get_fetch_stats(
    pool: &DbPool,
    username: &str,
) -> Result<Option<FetchStats>, StorageError> {
    sqlx::query_as::<_, FetchStats>("SELECT * FROM scraper_fetch_stats WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// Write back the full stats row after a fetch.
pub async fn upsert_fetch_stats(pool: &DbPool, stats: &FetchStats) -> Result<(), StorageError> {
    let last_fetch_at = stats
        .last_fetch_at
        .clone()
        .unwrap_or_else(now_utc);

    sqlx::query(
        "INSERT INTO scraper_fetch_stats \
         (username, last_fetch_at, last_fetched_count, last_new_count, \
          total_fetches, avg_new_rate, consecutive_empty_fetches) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(username) DO UPDATE SET \
           last_fetch_at = excluded.last_fetch_at, \
           last_fetched_count = excluded.last_fetched_count, \
           last_new_count = excluded.last_new_count, \
           total_fetches = excluded.total_fetches, \
           avg_new_rate = excluded.avg_new_rate, \
           consecutive_empty_fetches = excluded.consecutive_empty_fetches",
    )
    .bind(&stats.username)
    .bind(&last_fetch_at)
    .bind(stats.last_fetched_count)
    .bind(stats.last_new_count)
    .bind(stats.total_fetches)
    .bind(stats.avg_new_rate)
    .bind(stats.consecutive_empty_fetches)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn missing_stats_is_none() {
        let pool = init_test_db().await.expect("init db");
        assert!(get_fetch_stats(&pool, "ghost").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let pool = init_test_db().await.expect("init db");
        let stats = FetchStats {
            username: "alice".to_string(),
            last_fetch_at: None,
            last_fetched_count: 50,
            last_new_count: 10,
            total_fetches: 3,
            avg_new_rate: 0.2,
            consecutive_empty_fetches: 0,
        };

        upsert_fetch_stats(&pool, &stats).await.expect("upsert");

        let fetched = get_fetch_stats(&pool, "alice")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(fetched.last_fetched_count, 50);
        assert_eq!(fetched.total_fetches, 3);
        assert!((fetched.avg_new_rate - 0.2).abs() < f64::EPSILON);
        assert!(fetched.last_fetch_at.is_some());
    }

    #[tokio::test]
    async fn upsert_overwrites() {
        let pool = init_test_db().await.expect("init db");
        let mut stats = FetchStats {
            username: "alice".to_string(),
            last_fetch_at: None,
            last_fetched_count: 50,
            last_new_count: 10,
            total_fetches: 1,
            avg_new_rate: 0.2,
            consecutive_empty_fetches: 0,
        };
        upsert_fetch_stats(&pool, &stats).await.expect("first");

        stats.total_fetches = 2;
        stats.consecutive_empty_fetches = 1;
        upsert_fetch_stats(&pool, &stats).await.expect("second");

        let fetched = get_fetch_stats(&pool, "alice")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(fetched.total_fetches, 2);
        assert_eq!(fetched.consecutive_empty_fetches, 1);
    }
}
