//! Shared application state for the xwatcher server.

use std::sync::Arc;

use xwatcher_core::config::Config;
use xwatcher_core::metrics::Metrics;
use xwatcher_core::pipeline::Pipeline;
use xwatcher_core::scheduler::ScraperScheduler;
use xwatcher_core::storage::DbPool;
use xwatcher_core::tasks::TaskRegistry;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    /// SQLite connection pool.
    pub db: DbPool,
    /// Loaded service configuration.
    pub config: Config,
    /// Ingestion pipeline (coordinator, dedup, summariser, registry).
    pub pipeline: Arc<Pipeline>,
    /// The periodic scraper job.
    pub scheduler: Arc<ScraperScheduler>,
    /// Prometheus metrics.
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Shorthand for the pipeline's task registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.pipeline.registry
    }
}
