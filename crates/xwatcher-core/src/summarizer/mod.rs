//! Bilingual tweet summarisation with caching and bounded concurrency.
//!
//! Each unit of work is either a standalone tweet or the representative of
//! a dedup group. A worker makes two serial LLM calls (summary, then
//! translation) through the router and persists one summary record. Cache
//! hits — in-process first, then the persisted `content_hash` column —
//! skip the LLM entirely and cost nothing.

pub mod cache;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::defaults::SUMMARY_MAX_CHARS;
use crate::config::SummarizerConfig;
use crate::error::StorageError;
use crate::llm::router::LlmRouter;
use crate::llm::GenerationParams;
use crate::storage::summaries::Summary;
use crate::storage::tweets::Tweet;
use crate::storage::{self, DbPool};

use cache::{content_hash, CachedCompletion, SummaryCache};

/// Provider name recorded on pass-through and cached records with no call.
const PROVIDER_NONE: &str = "none";

/// Aggregate outcome of one summarisation batch.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SummaryBatchResult {
    /// Tweets found in the store for the requested ids.
    pub total_tweets: usize,
    /// Distinct dedup groups among them.
    pub total_groups: usize,
    /// Standalone tweets (no group).
    pub independent_tweets: usize,
    /// Units served from cache.
    pub cache_hits: usize,
    /// Units that required fresh work.
    pub cache_misses: usize,
    /// Tokens consumed by fresh LLM calls.
    pub total_tokens: u64,
    /// Cost of fresh LLM calls in USD.
    pub total_cost_usd: f64,
    /// Records produced per provider.
    pub providers_used: HashMap<String, u64>,
    /// Per-tweet failure messages.
    pub errors: HashMap<String, String>,
    /// Wall-clock duration in milliseconds.
    pub processing_time_ms: u64,
}

/// One unit of summarisation work.
struct WorkUnit {
    /// The tweet the record is written against (representative for groups).
    target: Tweet,
    /// Shared cache key.
    hash: String,
}

/// Outcome of one worker.
enum UnitResult {
    Done { record: Summary, cache_hit: bool },
    Failed { tweet_id: String, message: String },
}

/// Summarises batches of tweets through the LLM router.
pub struct Summarizer {
    pool: DbPool,
    router: Arc<LlmRouter>,
    cache: Arc<SummaryCache>,
    config: SummarizerConfig,
}

impl Summarizer {
    /// Create a summariser.
    pub fn new(pool: DbPool, router: Arc<LlmRouter>, config: SummarizerConfig) -> Self {
        Self {
            pool,
            router,
            cache: Arc::new(SummaryCache::new()),
            config,
        }
    }

    /// Access the in-process cache (for diagnostics and tests).
    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    /// Summarise a batch of tweets.
    ///
    /// Per-unit failures are collected in the result; only a failure to
    /// read the batch itself errors out. An empty batch is zero-work
    /// success.
    pub async fn summarize_batch(
        &self,
        tweet_ids: &[String],
        force_refresh: bool,
    ) -> Result<SummaryBatchResult, StorageError> {
        let started = Instant::now();
        let mut result = SummaryBatchResult::default();

        if tweet_ids.is_empty() {
            return Ok(result);
        }

        let tweets = storage::tweets::get_tweets_by_ids(&self.pool, tweet_ids).await?;
        result.total_tweets = tweets.len();

        let units = self.build_units(tweets, &mut result).await?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests.max(1)));
        let mut join_set = JoinSet::new();

        for unit in units {
            let pool = self.pool.clone();
            let router = self.router.clone();
            let cache = self.cache.clone();
            let config = self.config.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return UnitResult::Failed {
                            tweet_id: unit.target.tweet_id.clone(),
                            message: "worker pool closed".to_string(),
                        }
                    }
                };
                process_unit(&pool, router.as_ref(), cache.as_ref(), &config, unit, force_refresh)
                    .await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "summarizer worker panicked");
                    continue;
                }
            };
            match outcome {
                UnitResult::Done { record, cache_hit } => {
                    if cache_hit {
                        result.cache_hits += 1;
                    } else {
                        result.cache_misses += 1;
                    }
                    result.total_tokens += record.total_tokens.max(0) as u64;
                    result.total_cost_usd += record.cost_usd;
                    if record.model_provider != PROVIDER_NONE {
                        *result
                            .providers_used
                            .entry(record.model_provider.clone())
                            .or_insert(0) += 1;
                    }
                }
                UnitResult::Failed { tweet_id, message } => {
                    tracing::warn!(tweet_id = %tweet_id, error = %message, "summary unit failed");
                    result.errors.insert(tweet_id, message);
                }
            }
        }

        result.processing_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Partition tweets into work units: one per dedup group (targeting the
    /// representative) plus one per standalone tweet.
    async fn build_units(
        &self,
        tweets: Vec<Tweet>,
        result: &mut SummaryBatchResult,
    ) -> Result<Vec<WorkUnit>, StorageError> {
        let mut units = Vec::new();
        let mut seen_groups: HashMap<String, ()> = HashMap::new();
        let mut by_id: HashMap<String, Tweet> = HashMap::new();

        let (grouped, standalone): (Vec<Tweet>, Vec<Tweet>) = tweets
            .into_iter()
            .partition(|t| t.dedup_group_id.is_some());

        result.independent_tweets = standalone.len();
        for tweet in &grouped {
            by_id.insert(tweet.tweet_id.clone(), tweet.clone());
        }

        for tweet in grouped {
            let group_id = match tweet.dedup_group_id.clone() {
                Some(id) => id,
                None => continue,
            };
            if seen_groups.insert(group_id.clone(), ()).is_some() {
                continue;
            }

            let group = match storage::dedup_groups::get_group(&self.pool, &group_id).await? {
                Some(group) => group,
                None => {
                    // Dangling back-reference; treat the tweet as standalone.
                    let hash = content_hash(&tweet.tweet_id, None);
                    units.push(WorkUnit { target: tweet, hash });
                    continue;
                }
            };

            let representative = match by_id.get(&group.representative_tweet_id) {
                Some(t) => t.clone(),
                None => {
                    match storage::tweets::get_tweet_by_id(&self.pool, &group.representative_tweet_id)
                        .await?
                    {
                        Some(t) => t,
                        None => {
                            result.errors.insert(
                                group.representative_tweet_id.clone(),
                                "representative tweet missing".to_string(),
                            );
                            continue;
                        }
                    }
                }
            };

            let hash = content_hash(
                &representative.tweet_id,
                Some((&group.dedup_type, &group.representative_tweet_id)),
            );
            units.push(WorkUnit {
                target: representative,
                hash,
            });
        }
        result.total_groups = seen_groups.len();

        for tweet in standalone {
            let hash = content_hash(&tweet.tweet_id, None);
            units.push(WorkUnit { target: tweet, hash });
        }

        Ok(units)
    }
}

/// Process one unit: cache lookup, smart length policy, two LLM calls.
async fn process_unit(
    pool: &DbPool,
    router: &LlmRouter,
    cache: &SummaryCache,
    config: &SummarizerConfig,
    unit: WorkUnit,
    force_refresh: bool,
) -> UnitResult {
    let tweet = &unit.target;
    let tweet_id = tweet.tweet_id.clone();

    if !force_refresh {
        if let Some(hit) = lookup_cached(pool, cache, &unit.hash).await {
            let record = cached_record(tweet, &unit.hash, &hit);
            return persist(pool, record, true).await;
        }
    }

    // Smart length policy: short tweets pass through untouched.
    let text_len = tweet.text.chars().count();
    if text_len < config.min_tweet_length {
        let completion = CachedCompletion {
            summary_text: tweet.text.clone(),
            translation_text: None,
            provider: PROVIDER_NONE.to_string(),
            model: PROVIDER_NONE.to_string(),
            is_generated: false,
        };
        cache.insert(unit.hash.clone(), completion.clone());

        let record = Summary {
            summary_id: Uuid::new_v4().to_string(),
            tweet_id: tweet_id.clone(),
            summary_text: completion.summary_text,
            translation_text: None,
            model_provider: PROVIDER_NONE.to_string(),
            model_name: PROVIDER_NONE.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost_usd: 0.0,
            cached: false,
            is_generated_summary: false,
            content_hash: unit.hash,
            created_at: String::new(),
            updated_at: String::new(),
        };
        return persist(pool, record, false).await;
    }

    // Two serial LLM calls: summary, then translation.
    let params = GenerationParams::default();
    let summary = match router
        .complete(&summary_prompt(&tweet.text, config), &params)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            return UnitResult::Failed {
                tweet_id,
                message: e.to_string(),
            }
        }
    };

    let translation = match router
        .complete(&translation_prompt(&tweet.text), &params)
        .await
    {
        Ok(response) => Some(response),
        Err(e) => {
            tracing::warn!(tweet_id = %tweet_id, error = %e, "translation failed, keeping summary only");
            None
        }
    };

    let summary_text: String = summary.content.chars().take(SUMMARY_MAX_CHARS).collect();
    let translation_text = translation.as_ref().map(|t| t.content.clone());

    let mut prompt_tokens = summary.prompt_tokens;
    let mut completion_tokens = summary.completion_tokens;
    let mut cost_usd = summary.cost_usd;
    if let Some(t) = &translation {
        prompt_tokens += t.prompt_tokens;
        completion_tokens += t.completion_tokens;
        cost_usd += t.cost_usd;
    }

    cache.insert(
        unit.hash.clone(),
        CachedCompletion {
            summary_text: summary_text.clone(),
            translation_text: translation_text.clone(),
            provider: summary.provider.clone(),
            model: summary.model.clone(),
            is_generated: true,
        },
    );

    let record = Summary {
        summary_id: Uuid::new_v4().to_string(),
        tweet_id,
        summary_text,
        translation_text,
        model_provider: summary.provider,
        model_name: summary.model,
        prompt_tokens: i64::from(prompt_tokens),
        completion_tokens: i64::from(completion_tokens),
        total_tokens: i64::from(prompt_tokens + completion_tokens),
        cost_usd,
        cached: false,
        is_generated_summary: true,
        content_hash: unit.hash,
        created_at: String::new(),
        updated_at: String::new(),
    };
    persist(pool, record, false).await
}

/// Consult the in-process cache, then the persisted side.
async fn lookup_cached(
    pool: &DbPool,
    cache: &SummaryCache,
    hash: &str,
) -> Option<CachedCompletion> {
    if let Some(hit) = cache.get(hash) {
        return Some(hit);
    }

    match storage::summaries::get_summary_by_content_hash(pool, hash).await {
        Ok(Some(record)) => {
            let completion = CachedCompletion {
                summary_text: record.summary_text,
                translation_text: record.translation_text,
                provider: record.model_provider,
                model: record.model_name,
                is_generated: record.is_generated_summary,
            };
            cache.insert(hash.to_string(), completion.clone());
            Some(completion)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "persisted cache lookup failed");
            None
        }
    }
}

/// Build a record for a cache hit: no new tokens, no new cost.
fn cached_record(tweet: &Tweet, hash: &str, hit: &CachedCompletion) -> Summary {
    Summary {
        summary_id: Uuid::new_v4().to_string(),
        tweet_id: tweet.tweet_id.clone(),
        summary_text: hit.summary_text.clone(),
        translation_text: hit.translation_text.clone(),
        model_provider: hit.provider.clone(),
        model_name: hit.model.clone(),
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
        cost_usd: 0.0,
        cached: true,
        is_generated_summary: hit.is_generated,
        content_hash: hash.to_string(),
        created_at: String::new(),
        updated_at: String::new(),
    }
}

async fn persist(pool: &DbPool, record: Summary, cache_hit: bool) -> UnitResult {
    let tweet_id = record.tweet_id.clone();
    match storage::summaries::upsert_summary(pool, &record).await {
        Ok(()) => UnitResult::Done {
            record,
            cache_hit,
        },
        Err(e) => UnitResult::Failed {
            tweet_id,
            message: e.to_string(),
        },
    }
}

/// Prompt asking for a Chinese summary within the length window.
fn summary_prompt(text: &str, config: &SummarizerConfig) -> String {
    let len = text.chars().count();
    let max_chars = (((len as f64) * config.max_length_ratio).ceil() as usize).min(SUMMARY_MAX_CHARS);
    let min_chars = (((len as f64) * config.min_length_ratio).ceil() as usize).min(max_chars);
    format!(
        "请用中文总结以下推文，长度控制在{min_chars}到{max_chars}个字符之间。\
         只返回总结内容，不要添加任何前缀或解释。\n\n{text}"
    )
}

/// Prompt asking for a Chinese translation of the original text.
fn translation_prompt(text: &str) -> String {
    format!("请将以下推文翻译成中文，保留原文的语气和含义。只返回译文。\n\n{text}")
}
