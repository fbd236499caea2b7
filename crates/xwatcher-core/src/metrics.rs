//! Prometheus metrics for the ingestion pipeline.
//!
//! One registry per process, created at startup and shared by the pipeline
//! and scheduler. Export happens through the `/metrics` endpoint.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Process-wide metric handles.
pub struct Metrics {
    registry: Registry,
    /// Completed scrape runs.
    pub scrape_runs_total: IntCounter,
    /// Scheduler ticks skipped because a run was in flight.
    pub scrape_ticks_skipped_total: IntCounter,
    /// New tweets written.
    pub tweets_ingested_total: IntCounter,
    /// Dedup groups created.
    pub dedup_groups_total: IntCounter,
    /// Summary records produced, labelled by provider.
    pub summaries_total: IntCounterVec,
    /// Summariser cache hits.
    pub summary_cache_hits_total: IntCounter,
    /// Summariser cache misses.
    pub summary_cache_misses_total: IntCounter,
}

impl Metrics {
    /// Create and register all metrics.
    ///
    /// Panics on duplicate metric names, which cannot happen with the
    /// fixed set below.
    pub fn new() -> Self {
        let registry = Registry::new();

        let scrape_runs_total = IntCounter::with_opts(Opts::new(
            "xwatcher_scrape_runs_total",
            "Completed scrape runs",
        ))
        .expect("valid metric");
        let scrape_ticks_skipped_total = IntCounter::with_opts(Opts::new(
            "xwatcher_scrape_ticks_skipped_total",
            "Scheduler ticks skipped due to an in-flight run",
        ))
        .expect("valid metric");
        let tweets_ingested_total = IntCounter::with_opts(Opts::new(
            "xwatcher_tweets_ingested_total",
            "New tweets written to the store",
        ))
        .expect("valid metric");
        let dedup_groups_total = IntCounter::with_opts(Opts::new(
            "xwatcher_dedup_groups_total",
            "Dedup groups created",
        ))
        .expect("valid metric");
        let summaries_total = IntCounterVec::new(
            Opts::new("xwatcher_summaries_total", "Summary records produced"),
            &["provider"],
        )
        .expect("valid metric");
        let summary_cache_hits_total = IntCounter::with_opts(Opts::new(
            "xwatcher_summary_cache_hits_total",
            "Summariser cache hits",
        ))
        .expect("valid metric");
        let summary_cache_misses_total = IntCounter::with_opts(Opts::new(
            "xwatcher_summary_cache_misses_total",
            "Summariser cache misses",
        ))
        .expect("valid metric");

        for collector in [
            Box::new(scrape_runs_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(scrape_ticks_skipped_total.clone()),
            Box::new(tweets_ingested_total.clone()),
            Box::new(dedup_groups_total.clone()),
            Box::new(summaries_total.clone()),
            Box::new(summary_cache_hits_total.clone()),
            Box::new(summary_cache_misses_total.clone()),
        ] {
            registry.register(collector).expect("unique metric name");
        }

        Self {
            registry,
            scrape_runs_total,
            scrape_ticks_skipped_total,
            tweets_ingested_total,
            dedup_groups_total,
            summaries_total,
            summary_cache_hits_total,
            summary_cache_misses_total,
        }
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn export(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "metrics encoding failed");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
