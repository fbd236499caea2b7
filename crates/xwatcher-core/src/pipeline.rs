//! Pipeline glue: background jobs tying scraping, dedup, and summarisation
//! together through the task registry.
//!
//! HTTP handlers and the scheduler both drive the pipeline. Long-running
//! work is spawned onto the runtime with a registry record for polling;
//! the auto-summarisation hook runs only after the scrape's writes have
//! committed.

use std::sync::Arc;

use crate::dedup::{DedupEngine, DedupOptions};
use crate::error::ScraperError;
use crate::metrics::Metrics;
use crate::scraper::{ScrapeCoordinator, ScrapeResult};
use crate::storage::DbPool;
use crate::summarizer::Summarizer;
use crate::tasks::{TaskRegistry, TaskStatus};

/// Task type names used in the registry.
pub mod task_types {
    /// HTTP-triggered scrape.
    pub const SCRAPE: &str = "scrape";
    /// Scheduler-triggered scrape.
    pub const SCHEDULED_SCRAPE: &str = "scheduled_scrape";
    /// Dedup batch.
    pub const DEDUPLICATE: &str = "deduplicate";
    /// Summary batch.
    pub const SUMMARIZE: &str = "summarize";
    /// Post-scrape dedup + summarisation.
    pub const AUTO_SUMMARIZE: &str = "auto_summarize";
}

/// Shared pipeline dependencies. Cheap to clone: every field is a handle.
#[derive(Clone)]
pub struct Pipeline {
    /// Database pool.
    pub pool: DbPool,
    /// Multi-user scrape coordination.
    pub coordinator: Arc<ScrapeCoordinator>,
    /// Deduplication engine.
    pub dedup: Arc<DedupEngine>,
    /// Summarisation engine.
    pub summarizer: Arc<Summarizer>,
    /// Background task registry.
    pub registry: TaskRegistry,
    /// Prometheus metrics.
    pub metrics: Arc<Metrics>,
    /// Whether new tweets are summarised automatically after a scrape.
    pub auto_summarization: bool,
    /// Maximum tweets per auto-summarisation batch.
    pub auto_batch_size: usize,
    /// Similarity threshold for dedup runs.
    pub similarity_threshold: f64,
}

impl Pipeline {
    /// Run a scrape and, if enabled, kick off post-processing.
    ///
    /// The post-processing task (dedup, then summarisation in capped
    /// batches) is spawned after this function's writes have committed,
    /// and its ids are visible in the registry. The scrape result is
    /// returned without waiting for post-processing.
    pub async fn scrape_and_process(
        &self,
        usernames: &[String],
        limit_override: Option<u32>,
    ) -> Result<ScrapeResult, ScraperError> {
        let result = self.coordinator.scrape_users(usernames, limit_override).await?;

        self.metrics.scrape_runs_total.inc();
        self.metrics
            .tweets_ingested_total
            .inc_by(result.new_tweets);

        if self.auto_summarization && !result.new_tweet_ids.is_empty() {
            self.spawn_auto_summarize(result.new_tweet_ids.clone());
        }

        Ok(result)
    }

    /// Spawn an HTTP-triggered scrape as a background task.
    pub fn spawn_scrape_task(
        &self,
        usernames: Vec<String>,
        limit_override: Option<u32>,
    ) -> String {
        let task_id = self.registry.create(task_types::SCRAPE);
        let pipeline = self.clone();
        let id = task_id.clone();

        tokio::spawn(async move {
            pipeline.mark_running(&id);
            match pipeline.scrape_and_process(&usernames, limit_override).await {
                Ok(result) => {
                    let payload = serde_json::to_value(&result).unwrap_or_default();
                    pipeline.mark_done(&id, TaskStatus::Completed, Some(payload), None);
                }
                Err(e) => {
                    pipeline.mark_done(&id, TaskStatus::Failed, None, Some(e.to_string()));
                }
            }
        });

        task_id
    }

    /// Spawn a dedup batch as a background task.
    ///
    /// `threshold_override` replaces the configured similarity threshold
    /// for this run only.
    pub fn spawn_dedup_task(
        &self,
        tweet_ids: Vec<String>,
        force_refresh: bool,
        threshold_override: Option<f64>,
    ) -> String {
        let task_id = self.registry.create(task_types::DEDUPLICATE);
        let pipeline = self.clone();
        let id = task_id.clone();

        tokio::spawn(async move {
            pipeline.mark_running(&id);
            let options = DedupOptions {
                similarity_threshold: threshold_override
                    .unwrap_or(pipeline.similarity_threshold),
                force_refresh,
            };
            match pipeline.dedup.deduplicate(&tweet_ids, options).await {
                Ok(stats) => {
                    pipeline
                        .metrics
                        .dedup_groups_total
                        .inc_by(stats.groups.len() as u64);
                    let payload = serde_json::to_value(&stats).unwrap_or_default();
                    pipeline.mark_done(&id, TaskStatus::Completed, Some(payload), None);
                }
                Err(e) => {
                    pipeline.mark_done(&id, TaskStatus::Failed, None, Some(e.to_string()));
                }
            }
        });

        task_id
    }

    /// Spawn a summarisation batch as a background task.
    pub fn spawn_summary_task(
        &self,
        tweet_ids: Vec<String>,
        force_refresh: bool,
    ) -> String {
        let task_id = self.registry.create(task_types::SUMMARIZE);
        let pipeline = self.clone();
        let id = task_id.clone();

        tokio::spawn(async move {
            pipeline.mark_running(&id);
            match pipeline.summarizer.summarize_batch(&tweet_ids, force_refresh).await {
                Ok(result) => {
                    pipeline.observe_summary_result(&result);
                    let payload = serde_json::to_value(&result).unwrap_or_default();
                    pipeline.mark_done(&id, TaskStatus::Completed, Some(payload), None);
                }
                Err(e) => {
                    pipeline.mark_done(&id, TaskStatus::Failed, None, Some(e.to_string()));
                }
            }
        });

        task_id
    }

    /// Post-scrape hook: dedup the new batch, then summarise it in capped
    /// sequential chunks.
    fn spawn_auto_summarize(&self, new_tweet_ids: Vec<String>) {
        let task_id = self.registry.create(task_types::AUTO_SUMMARIZE);
        let pipeline = self.clone();

        tokio::spawn(async move {
            pipeline.mark_running(&task_id);

            let options = DedupOptions {
                similarity_threshold: pipeline.similarity_threshold,
                force_refresh: false,
            };
            let dedup_stats = match pipeline.dedup.deduplicate(&new_tweet_ids, options).await {
                Ok(stats) => {
                    pipeline
                        .metrics
                        .dedup_groups_total
                        .inc_by(stats.groups.len() as u64);
                    stats
                }
                Err(e) => {
                    tracing::warn!(error = %e, "auto dedup failed, summarising ungrouped");
                    crate::dedup::DedupStats::default()
                }
            };

            let chunk_size = pipeline.auto_batch_size.max(1);
            let total_chunks = new_tweet_ids.len().div_ceil(chunk_size);
            let mut summarized = 0usize;
            let mut failed = 0usize;

            for (index, chunk) in new_tweet_ids.chunks(chunk_size).enumerate() {
                let _ = pipeline
                    .registry
                    .update_progress(&task_id, index as u64, total_chunks as u64);

                match pipeline.summarizer.summarize_batch(chunk, false).await {
                    Ok(result) => {
                        pipeline.observe_summary_result(&result);
                        summarized += result.cache_hits + result.cache_misses;
                        failed += result.errors.len();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "auto summarisation chunk failed");
                        failed += chunk.len();
                    }
                }
            }

            let payload = serde_json::json!({
                "dedup_groups": dedup_stats.groups.len(),
                "summarized_units": summarized,
                "failed_units": failed,
            });
            pipeline.mark_done(&task_id, TaskStatus::Completed, Some(payload), None);
        });
    }

    fn observe_summary_result(&self, result: &crate::summarizer::SummaryBatchResult) {
        self.metrics
            .summary_cache_hits_total
            .inc_by(result.cache_hits as u64);
        self.metrics
            .summary_cache_misses_total
            .inc_by(result.cache_misses as u64);
        for (provider, count) in &result.providers_used {
            self.metrics
                .summaries_total
                .with_label_values(&[provider.as_str()])
                .inc_by(*count);
        }
    }

    fn mark_running(&self, task_id: &str) {
        if let Err(e) = self
            .registry
            .update_status(task_id, TaskStatus::Running, None, None)
        {
            tracing::error!(task_id, error = %e, "failed to mark task running");
        }
    }

    fn mark_done(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        if let Err(e) = self.registry.update_status(task_id, status, result, error) {
            tracing::error!(task_id, error = %e, "failed to finalise task");
        }
    }
}
