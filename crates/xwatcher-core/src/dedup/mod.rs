//! Tweet deduplication: exact fingerprints and TF-IDF similarity.
//!
//! Two passes over a batch of tweet ids. The exact pass groups identical
//! (author, text) fingerprints and retweets of the same original; the
//! similarity pass clusters the remainder by cosine similarity. All groups
//! from one invocation commit atomically; a similarity-pass failure still
//! commits the exact groups and surfaces a warning.

pub mod tfidf;

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::DedupError;
use crate::storage::dedup_groups::{DedupGroup, DEDUP_TYPE_EXACT, DEDUP_TYPE_SIMILAR};
use crate::storage::tweets::Tweet;
use crate::storage::{self, DbPool};

/// Outcome of one deduplication run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DedupStats {
    /// Tweets considered (found in the store).
    pub total_tweets: usize,
    /// Tweets skipped because they already belong to a group.
    pub already_grouped: usize,
    /// Exact-duplicate groups created.
    pub exact_groups: usize,
    /// Similar-content groups created.
    pub similar_groups: usize,
    /// Tweets placed into a group by this run.
    pub grouped_tweets: usize,
    /// The created groups.
    pub groups: Vec<DedupGroup>,
    /// Non-fatal warning (similarity pass degraded).
    pub warning: Option<String>,
}

/// Tunables for a deduplication run.
#[derive(Debug, Clone, Copy)]
pub struct DedupOptions {
    /// Cosine threshold for the similar-content pass.
    pub similarity_threshold: f64,
    /// Delete and rebuild groups covering the batch before running.
    pub force_refresh: bool,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: crate::config::defaults::SIMILARITY_THRESHOLD,
            force_refresh: false,
        }
    }
}

/// Groups duplicate and near-duplicate tweets.
pub struct DedupEngine {
    pool: DbPool,
}

impl DedupEngine {
    /// Create an engine over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run both passes over the given tweet ids and persist the groups.
    pub async fn deduplicate(
        &self,
        tweet_ids: &[String],
        options: DedupOptions,
    ) -> Result<DedupStats, DedupError> {
        if tweet_ids.is_empty() {
            return Ok(DedupStats::default());
        }

        if options.force_refresh {
            let deleted =
                storage::dedup_groups::delete_groups_for_tweets(&self.pool, tweet_ids).await?;
            if deleted > 0 {
                tracing::info!(deleted, "force refresh removed existing groups");
            }
        }

        let tweets = storage::tweets::get_tweets_by_ids(&self.pool, tweet_ids).await?;
        let total_tweets = tweets.len();

        // A tweet already in a group is excluded unless we just cleared it.
        let (eligible, already_grouped): (Vec<Tweet>, Vec<Tweet>) = tweets
            .into_iter()
            .partition(|t| t.dedup_group_id.is_none() || options.force_refresh);

        let mut stats = DedupStats {
            total_tweets,
            already_grouped: already_grouped.len(),
            ..DedupStats::default()
        };

        let (exact_groups, remainder) = exact_pass(&eligible);
        stats.exact_groups = exact_groups.len();

        let mut groups = exact_groups;

        match similarity_pass(&remainder, options.similarity_threshold).await {
            Ok(similar_groups) => {
                stats.similar_groups = similar_groups.len();
                groups.extend(similar_groups);
            }
            Err(message) => {
                tracing::warn!(error = %message, "similarity pass failed, committing exact groups only");
                stats.warning = Some(format!("similarity pass failed: {message}"));
            }
        }

        stats.grouped_tweets = groups.iter().map(|g| g.tweet_ids.len()).sum();
        storage::dedup_groups::insert_groups(&self.pool, &groups).await?;
        stats.groups = groups;

        Ok(stats)
    }
}

/// Choose the representative: earliest `created_at`, ties broken by
/// smallest tweet id.
fn representative(tweets: &[&Tweet]) -> String {
    tweets
        .iter()
        .min_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.tweet_id.cmp(&b.tweet_id))
        })
        .map(|t| t.tweet_id.clone())
        .unwrap_or_default()
}

/// Fingerprint for the exact pass.
#[derive(Hash, PartialEq, Eq)]
enum Fingerprint {
    /// Author plus whitespace-normalised text, case-sensitive.
    Content(String, String),
    /// Retweets collapse onto the identity of their original.
    Retweet(String),
}

fn fingerprint(tweet: &Tweet) -> Fingerprint {
    if tweet.reference_type.as_deref() == Some("retweeted") {
        if let Some(ref_id) = &tweet.referenced_tweet_id {
            return Fingerprint::Retweet(ref_id.clone());
        }
        if let Some(ref_text) = &tweet.referenced_tweet_text {
            return Fingerprint::Retweet(normalize_ws(ref_text));
        }
    }
    Fingerprint::Content(tweet.author_username.clone(), normalize_ws(&tweet.text))
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Group exact duplicates. Returns the groups and the tweets left over
/// for the similarity pass.
fn exact_pass(tweets: &[Tweet]) -> (Vec<DedupGroup>, Vec<Tweet>) {
    let mut buckets: HashMap<Fingerprint, Vec<&Tweet>> = HashMap::new();
    for tweet in tweets {
        buckets.entry(fingerprint(tweet)).or_default().push(tweet);
    }

    let mut grouped_ids: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut groups = Vec::new();

    for members in buckets.into_values() {
        if members.len() < 2 {
            continue;
        }
        let mut tweet_ids: Vec<String> = members.iter().map(|t| t.tweet_id.clone()).collect();
        tweet_ids.sort();
        grouped_ids.extend(tweet_ids.iter().cloned());
        groups.push(DedupGroup {
            group_id: Uuid::new_v4().to_string(),
            representative_tweet_id: representative(&members),
            dedup_type: DEDUP_TYPE_EXACT.to_string(),
            similarity_score: None,
            tweet_ids,
            created_at: String::new(),
        });
    }

    // Deterministic output order for tests and logs.
    groups.sort_by(|a, b| a.representative_tweet_id.cmp(&b.representative_tweet_id));

    let remainder = tweets
        .iter()
        .filter(|t| !grouped_ids.contains(&t.tweet_id))
        .cloned()
        .collect();
    (groups, remainder)
}

/// Cluster the remaining tweets by TF-IDF cosine similarity.
///
/// The vectorisation runs on a blocking thread; a panic there is reported
/// as a pass failure rather than poisoning the caller.
async fn similarity_pass(tweets: &[Tweet], threshold: f64) -> Result<Vec<DedupGroup>, String> {
    if tweets.len() < 2 {
        return Ok(Vec::new());
    }

    let documents: Vec<String> = tweets.iter().map(|t| tfidf::preprocess(&t.text)).collect();

    let matrix = tokio::task::spawn_blocking(move || {
        let matrix = tfidf::similarity_matrix(&documents);
        let clusters = tfidf::single_linkage_clusters(&matrix, threshold);
        (matrix, clusters)
    })
    .await
    .map_err(|e| format!("vectoriser task failed: {e}"))?;

    let (matrix, clusters) = matrix;

    let mut groups = Vec::new();
    for cluster in clusters {
        let members: Vec<&Tweet> = cluster.iter().map(|&i| &tweets[i]).collect();
        let mut tweet_ids: Vec<String> = members.iter().map(|t| t.tweet_id.clone()).collect();
        tweet_ids.sort();
        groups.push(DedupGroup {
            group_id: Uuid::new_v4().to_string(),
            representative_tweet_id: representative(&members),
            dedup_type: DEDUP_TYPE_SIMILAR.to_string(),
            similarity_score: Some(tfidf::min_pairwise_similarity(&cluster, &matrix)),
            tweet_ids,
            created_at: String::new(),
        });
    }
    groups.sort_by(|a, b| a.representative_tweet_id.cmp(&b.representative_tweet_id));
    Ok(groups)
}
