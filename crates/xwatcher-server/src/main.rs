//! xwatcher API server binary.
//!
//! Wires configuration, storage, the ingestion pipeline, the scheduler,
//! and the HTTP router, then serves until Ctrl+C / SIGTERM.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use xwatcher_core::config::Config;
use xwatcher_core::dedup::DedupEngine;
use xwatcher_core::llm::openai_compat::OpenAiCompatProvider;
use xwatcher_core::llm::router::{ChainEntry, LlmRouter, ProviderRates};
use xwatcher_core::metrics::Metrics;
use xwatcher_core::pipeline::Pipeline;
use xwatcher_core::scheduler::ScraperScheduler;
use xwatcher_core::scraper::{LimitParams, ScrapeCoordinator, ScraperClient};
use xwatcher_core::storage;
use xwatcher_core::summarizer::Summarizer;
use xwatcher_core::tasks::{self, TaskRegistry};

use xwatcher_server::state::AppState;

/// xwatcher API server — tweet monitoring, dedup, and summarisation.
#[derive(Parser)]
#[command(name = "xwatcher-server", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Host address to bind to. Use 0.0.0.0 for external access.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;

    // RUST_LOG wins; LOG_LEVEL is the configured default.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    tracing::info!(
        db = %config.database_url,
        host = %cli.host,
        port = cli.port,
        providers = ?config.llm_providers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        "starting xwatcher server"
    );

    let pool = storage::init_db(&config.database_url).await?;

    // Seed the singleton schedule row from the environment on first boot.
    storage::schedule::ensure_schedule_config(
        &pool,
        config.scraper.interval_seconds,
        config.scraper.enabled,
    )
    .await?;

    let fetcher = Arc::new(ScraperClient::new(
        config.scraper.base_url.clone(),
        config.scraper.api_key.clone(),
    ));
    let coordinator = Arc::new(ScrapeCoordinator::new(
        pool.clone(),
        fetcher,
        LimitParams {
            default_limit: config.scraper.default_limit,
            ..LimitParams::default()
        },
        config.scraper.max_concurrent_scrapes,
    ));

    let chain: Vec<ChainEntry> = config
        .llm_providers
        .iter()
        .map(|provider| ChainEntry {
            provider: Box::new(OpenAiCompatProvider::from_config(provider)),
            rates: ProviderRates {
                rate_in: provider.rate_in,
                rate_out: provider.rate_out,
            },
        })
        .collect();
    if chain.is_empty() {
        tracing::warn!("no LLM providers configured — summarisation will fail until one is set");
    }
    let router = Arc::new(LlmRouter::new(chain));

    let summarizer = Arc::new(Summarizer::new(
        pool.clone(),
        router,
        config.summarizer.clone(),
    ));

    let metrics = Arc::new(Metrics::new());
    let registry = TaskRegistry::new();

    let pipeline = Arc::new(Pipeline {
        pool: pool.clone(),
        coordinator,
        dedup: Arc::new(DedupEngine::new(pool.clone())),
        summarizer,
        registry: registry.clone(),
        metrics: metrics.clone(),
        auto_summarization: config.summarizer.auto_enabled,
        auto_batch_size: config.summarizer.auto_batch_size,
        similarity_threshold: config.dedup.similarity_threshold,
    });

    let scheduler = Arc::new(ScraperScheduler::new(pool.clone(), pipeline.clone()));

    // Background loops, all stopped by one cancellation token.
    let cancel = CancellationToken::new();
    let scheduler_handle = tokio::spawn(scheduler.clone().run(cancel.clone()));
    let sweeper_handle = tokio::spawn(tasks::run_sweeper(registry, cancel.clone()));

    let state = Arc::new(AppState {
        db: pool,
        config,
        pipeline,
        scheduler,
        metrics,
    });

    let router = xwatcher_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", cli.host, cli.port)).await?;
    tracing::info!("listening on http://{}:{}", cli.host, cli.port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down background loops");
    cancel.cancel();
    let _ = scheduler_handle.await;
    let _ = sweeper_handle.await;

    Ok(())
}

/// Resolve when Ctrl+C (or SIGTERM on Unix) arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler, using Ctrl+C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for Ctrl+C");
                }
                return;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Ctrl+C handler error");
                }
                tracing::info!("received Ctrl+C");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        }
    }
}
