//! CRUD operations for ingested tweets.
//!
//! Tweets are immutable once written except for the nullable dedup-group
//! back-reference. Media lists are stored as JSON text columns so their
//! ordering survives round-trips.

use super::{now_utc, DbPool};
use crate::error::StorageError;
use serde::{Deserialize, Serialize};

/// One attached media object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Provider-assigned media key.
    pub key: String,
    /// Media kind ("photo", "video", "animated_gif").
    #[serde(rename = "type")]
    pub media_type: String,
    /// Direct URL of the media asset.
    pub url: String,
    /// Pixel width, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    /// Pixel height, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
}

/// A canonical tweet record.
#[derive(Debug, Clone, Serialize)]
pub struct Tweet {
    /// Globally unique tweet id (natural primary key).
    pub tweet_id: String,
    /// Cleaned tweet text.
    pub text: String,
    /// Original creation time, RFC 3339 UTC.
    pub created_at: String,
    /// @handle of the author.
    pub author_username: String,
    /// Display name of the author.
    pub author_display_name: String,
    /// Id of the referenced tweet, if any. May point outside our store.
    pub referenced_tweet_id: Option<String>,
    /// Reference relation: "retweeted", "quoted", or "replied_to".
    pub reference_type: Option<String>,
    /// Denormalised text of the referenced tweet.
    pub referenced_tweet_text: Option<String>,
    /// Denormalised media of the referenced tweet.
    pub referenced_tweet_media: Vec<MediaItem>,
    /// @handle of the referenced tweet's author.
    pub referenced_tweet_author_username: Option<String>,
    /// Ordered media attachments.
    pub media: Vec<MediaItem>,
    /// Back-reference to the dedup group this tweet belongs to, if any.
    pub dedup_group_id: Option<String>,
    /// Server-side insertion time, RFC 3339 UTC. Drives the incremental feed.
    pub db_created_at: String,
}

/// Raw row shape; media columns hold JSON text.
#[derive(sqlx::FromRow)]
struct TweetRow {
    tweet_id: String,
    text: String,
    created_at: String,
    author_username: String,
    author_display_name: String,
    referenced_tweet_id: Option<String>,
    reference_type: Option<String>,
    referenced_tweet_text: Option<String>,
    referenced_tweet_media: String,
    referenced_tweet_author_username: Option<String>,
    media: String,
    dedup_group_id: Option<String>,
    db_created_at: String,
}

impl TweetRow {
    fn into_tweet(self) -> Result<Tweet, StorageError> {
        Ok(Tweet {
            media: decode_media(&self.media)?,
            referenced_tweet_media: decode_media(&self.referenced_tweet_media)?,
            tweet_id: self.tweet_id,
            text: self.text,
            created_at: self.created_at,
            author_username: self.author_username,
            author_display_name: self.author_display_name,
            referenced_tweet_id: self.referenced_tweet_id,
            reference_type: self.reference_type,
            referenced_tweet_text: self.referenced_tweet_text,
            referenced_tweet_author_username: self.referenced_tweet_author_username,
            dedup_group_id: self.dedup_group_id,
            db_created_at: self.db_created_at,
        })
    }
}

fn decode_media(json: &str) -> Result<Vec<MediaItem>, StorageError> {
    serde_json::from_str(json).map_err(|e| StorageError::Decode {
        message: format!("invalid media JSON: {e}"),
    })
}

fn encode_media(items: &[MediaItem]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Result of a batch insert: how many rows were new vs already present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInsertResult {
    /// Rows inserted for the first time.
    pub new: u64,
    /// Rows skipped because the tweet id already existed.
    pub skipped: u64,
    /// Ids of the newly inserted rows, in batch order.
    pub new_ids: Vec<String>,
}

/// Insert a batch of tweets in a single transaction.
///
/// Uses `INSERT OR IGNORE` keyed on `tweet_id`; conflicts count as skipped.
/// Insertion order within the batch is preserved.
pub async fn insert_tweets(
    pool: &DbPool,
    tweets: &[Tweet],
) -> Result<BatchInsertResult, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    let mut result = BatchInsertResult::default();
    for tweet in tweets {
        let db_created_at = if tweet.db_created_at.is_empty() {
            now_utc()
        } else {
            tweet.db_created_at.clone()
        };

        let outcome = sqlx::query(
            "INSERT OR IGNORE INTO tweets \
             (tweet_id, text, created_at, author_username, author_display_name, \
              referenced_tweet_id, reference_type, referenced_tweet_text, \
              referenced_tweet_media, referenced_tweet_author_username, media, \
              dedup_group_id, db_created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)",
        )
        .bind(&tweet.tweet_id)
        .bind(&tweet.text)
        .bind(&tweet.created_at)
        .bind(&tweet.author_username)
        .bind(&tweet.author_display_name)
        .bind(&tweet.referenced_tweet_id)
        .bind(&tweet.reference_type)
        .bind(&tweet.referenced_tweet_text)
        .bind(encode_media(&tweet.referenced_tweet_media))
        .bind(&tweet.referenced_tweet_author_username)
        .bind(encode_media(&tweet.media))
        .bind(&db_created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

        if outcome.rows_affected() == 1 {
            result.new += 1;
            result.new_ids.push(tweet.tweet_id.clone());
        } else {
            result.skipped += 1;
        }
    }

    tx.commit()
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(result)
}

/// Fetch a single tweet by id. Returns `None` if not found.
pub async fn get_tweet_by_id(
    pool: &DbPool,
    tweet_id: &str,
) -> Result<Option<Tweet>, StorageError> {
    let row = sqlx::query_as::<_, TweetRow>("SELECT * FROM tweets WHERE tweet_id = ?")
        .bind(tweet_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    row.map(TweetRow::into_tweet).transpose()
}

/// Fetch tweets for a list of ids. Missing ids are silently absent
/// from the result; order follows `created_at` ascending.
pub async fn get_tweets_by_ids(
    pool: &DbPool,
    tweet_ids: &[String],
) -> Result<Vec<Tweet>, StorageError> {
    if tweet_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; tweet_ids.len()].join(", ");
    let sql = format!(
        "SELECT * FROM tweets WHERE tweet_id IN ({placeholders}) ORDER BY created_at ASC, tweet_id ASC"
    );

    let mut query = sqlx::query_as::<_, TweetRow>(&sql);
    for id in tweet_ids {
        query = query.bind(id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    rows.into_iter().map(TweetRow::into_tweet).collect()
}

/// A tweet with derived presence flags for list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TweetWithFlags {
    /// The tweet record.
    #[serde(flatten)]
    pub tweet: Tweet,
    /// Whether a summary record exists for this tweet.
    pub has_summary: bool,
    /// Whether this tweet belongs to a dedup group.
    pub has_deduplication: bool,
}

/// Paginated tweet listing, newest first, optionally filtered by author.
pub async fn list_tweets(
    pool: &DbPool,
    page: u32,
    page_size: u32,
    author: Option<&str>,
) -> Result<(Vec<TweetWithFlags>, i64), StorageError> {
    let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

    let (rows, total) = if let Some(author) = author {
        let rows = sqlx::query_as::<_, TweetRow>(
            "SELECT * FROM tweets WHERE author_username = ? \
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(author)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tweets WHERE author_username = ?")
                .bind(author)
                .fetch_one(pool)
                .await
                .map_err(|e| StorageError::Query { source: e })?;
        (rows, total.0)
    } else {
        let rows = sqlx::query_as::<_, TweetRow>(
            "SELECT * FROM tweets ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tweets")
            .fetch_one(pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;
        (rows, total.0)
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let tweet = row.into_tweet()?;
        let has_summary = super::summaries::summary_exists(pool, &tweet.tweet_id).await?;
        let has_deduplication = tweet.dedup_group_id.is_some();
        out.push(TweetWithFlags {
            tweet,
            has_summary,
            has_deduplication,
        });
    }

    Ok((out, total))
}

/// Incremental feed ordered by insertion time ascending.
///
/// `since` and `until` bound `db_created_at` exclusively on the left and
/// inclusively on the right, so pollers can pass the last timestamp they saw.
pub async fn feed(
    pool: &DbPool,
    since: Option<&str>,
    until: Option<&str>,
    limit: u32,
) -> Result<Vec<Tweet>, StorageError> {
    let rows = sqlx::query_as::<_, TweetRow>(
        "SELECT * FROM tweets \
         WHERE (?1 IS NULL OR db_created_at > ?1) \
           AND (?2 IS NULL OR db_created_at <= ?2) \
         ORDER BY db_created_at ASC, tweet_id ASC \
         LIMIT ?3",
    )
    .bind(since)
    .bind(until)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    rows.into_iter().map(TweetRow::into_tweet).collect()
}

/// Check if a tweet exists.
pub async fn tweet_exists(pool: &DbPool, tweet_id: &str) -> Result<bool, StorageError> {
    let row: (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM tweets WHERE tweet_id = ?)")
        .bind(tweet_id)
        .fetch_one(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(row.0 == 1)
}

/// Build a minimal tweet for tests.
#[cfg(any(test, feature = "test-helpers"))]
pub fn sample_tweet(id: &str, author: &str, text: &str) -> Tweet {
    Tweet {
        tweet_id: id.to_string(),
        text: text.to_string(),
        created_at: "2026-03-01T12:00:00Z".to_string(),
        author_username: author.to_string(),
        author_display_name: format!("{author} display"),
        referenced_tweet_id: None,
        reference_type: None,
        referenced_tweet_text: None,
        referenced_tweet_media: Vec::new(),
        referenced_tweet_author_username: None,
        media: Vec::new(),
        dedup_group_id: None,
        db_created_at: String::new(),
    }
}
