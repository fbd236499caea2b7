//! Periodic scraper job with at-most-one concurrent run.
//!
//! A polling loop compares the persisted schedule against the clock. Due
//! ticks try to take the run guard; if a run is already in flight the tick
//! is skipped and counted, never queued. Admin operations persist to the
//! singleton schedule row so a restart restores state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;
use crate::pipeline::{task_types, Pipeline};
use crate::storage::{self, schedule, DbPool};
use crate::tasks::TaskStatus;

/// Furthest ahead a one-shot run may be scheduled.
const MAX_NEXT_RUN_AHEAD_DAYS: i64 = 30;

/// Clock tolerance when validating a one-shot run time.
const NEXT_RUN_TOLERANCE_SECS: i64 = 30;

/// Snapshot of scheduler state for health and admin endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    /// Whether the schedule is enabled.
    pub is_enabled: bool,
    /// Interval between runs in seconds.
    pub interval_seconds: i64,
    /// Pending one-shot override, RFC 3339 UTC.
    pub next_run_time: Option<String>,
    /// Next interval tick, RFC 3339 UTC.
    pub next_due: Option<String>,
    /// Whether a run is in flight right now.
    pub is_running: bool,
    /// Ticks skipped because a run was in flight.
    pub skipped_ticks: u64,
    /// When the last run finished, RFC 3339 UTC.
    pub last_run_at: Option<String>,
}

/// The periodic scraper job.
pub struct ScraperScheduler {
    pool: DbPool,
    pipeline: Arc<Pipeline>,
    run_guard: Arc<tokio::sync::Mutex<()>>,
    next_due: Mutex<Option<DateTime<Utc>>>,
    last_run_at: Mutex<Option<String>>,
    skipped_ticks: AtomicU64,
    poll_interval: Duration,
}

impl ScraperScheduler {
    /// Create a scheduler with the default 5-second poll granularity.
    pub fn new(pool: DbPool, pipeline: Arc<Pipeline>) -> Self {
        Self {
            pool,
            pipeline,
            run_guard: Arc::new(tokio::sync::Mutex::new(())),
            next_due: Mutex::new(None),
            last_run_at: Mutex::new(None),
            skipped_ticks: AtomicU64::new(0),
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Override the poll granularity (used by tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Whether a scrape run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Ticks skipped because a run was in flight.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Current status snapshot.
    pub async fn status(&self) -> Result<SchedulerStatus, SchedulerError> {
        let config = schedule::get_schedule_config(&self.pool).await?;
        let (is_enabled, interval_seconds, next_run_time) = match config {
            Some(c) => (c.is_enabled, c.interval_seconds, c.next_run_time),
            None => (false, 0, None),
        };

        Ok(SchedulerStatus {
            is_enabled,
            interval_seconds,
            next_run_time,
            next_due: self
                .read_next_due()
                .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            is_running: self.is_running(),
            skipped_ticks: self.skipped_ticks(),
            last_run_at: self.read_last_run(),
        })
    }

    /// Change the run interval. Validates the `[300, 604800]` range,
    /// persists it, and reschedules the next tick from now.
    pub async fn update_interval(
        &self,
        interval_seconds: i64,
        updated_by: &str,
    ) -> Result<(), SchedulerError> {
        if !(crate::config::defaults::MIN_INTERVAL_SECONDS
            ..=crate::config::defaults::MAX_INTERVAL_SECONDS)
            .contains(&interval_seconds)
        {
            return Err(SchedulerError::IntervalOutOfRange {
                seconds: interval_seconds,
            });
        }

        schedule::set_interval(&self.pool, interval_seconds, updated_by).await?;
        self.write_next_due(Some(Utc::now() + chrono::Duration::seconds(interval_seconds)));
        tracing::info!(interval_seconds, updated_by, "scrape interval updated");
        Ok(())
    }

    /// Schedule a one-shot run. The timestamp must be in the future
    /// (30-second tolerance) and within 30 days.
    pub async fn set_next_run(
        &self,
        next_run_time: &str,
        updated_by: &str,
    ) -> Result<(), SchedulerError> {
        let parsed = DateTime::parse_from_rfc3339(next_run_time)
            .map_err(|e| SchedulerError::InvalidNextRun {
                message: format!("not a valid RFC 3339 timestamp: {e}"),
            })?
            .with_timezone(&Utc);

        let now = Utc::now();
        if parsed < now - chrono::Duration::seconds(NEXT_RUN_TOLERANCE_SECS) {
            return Err(SchedulerError::InvalidNextRun {
                message: "next run time is in the past".to_string(),
            });
        }
        if parsed > now + chrono::Duration::days(MAX_NEXT_RUN_AHEAD_DAYS) {
            return Err(SchedulerError::InvalidNextRun {
                message: format!("next run time is more than {MAX_NEXT_RUN_AHEAD_DAYS} days ahead"),
            });
        }

        let stored = parsed.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        schedule::set_next_run_time(&self.pool, Some(&stored), updated_by).await?;
        tracing::info!(next_run_time = %stored, updated_by, "one-shot run scheduled");
        Ok(())
    }

    /// Enable the schedule and arm the next tick.
    pub async fn enable(&self, updated_by: &str) -> Result<(), SchedulerError> {
        schedule::set_enabled(&self.pool, true, updated_by).await?;
        let interval = self.current_interval().await?;
        self.write_next_due(Some(Utc::now() + chrono::Duration::seconds(interval)));
        tracing::info!(updated_by, "scraper schedule enabled");
        Ok(())
    }

    /// Disable the schedule. A running scrape is never preempted.
    pub async fn disable(&self, updated_by: &str) -> Result<(), SchedulerError> {
        schedule::set_enabled(&self.pool, false, updated_by).await?;
        self.write_next_due(None);
        tracing::info!(updated_by, "scraper schedule disabled");
        Ok(())
    }

    /// Run the scheduler loop until cancelled.
    ///
    /// Reads the persisted singleton on entry so a restart resumes where
    /// the previous process left off.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        match schedule::get_schedule_config(&self.pool).await {
            Ok(Some(config)) if config.is_enabled => {
                self.write_next_due(Some(
                    Utc::now() + chrono::Duration::seconds(config.interval_seconds),
                ));
                tracing::info!(
                    interval_seconds = config.interval_seconds,
                    "scraper schedule restored"
                );
            }
            Ok(_) => tracing::info!("scraper schedule not enabled"),
            Err(e) => tracing::error!(error = %e, "failed to read schedule config"),
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("scheduler loop cancelled");
                    return;
                }
                () = tokio::time::sleep(self.poll_interval) => {}
            }

            let config = match schedule::get_schedule_config(&self.pool).await {
                Ok(Some(config)) => config,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read schedule config");
                    continue;
                }
            };
            if !config.is_enabled {
                continue;
            }

            let now = Utc::now();
            let oneshot_due = config
                .next_run_time
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|t| t.with_timezone(&Utc) <= now)
                .unwrap_or(false);
            let interval_due = self.read_next_due().map(|t| t <= now).unwrap_or(false);

            if !oneshot_due && !interval_due {
                continue;
            }

            match self.run_guard.clone().try_lock_owned() {
                Ok(permit) => {
                    if oneshot_due {
                        if let Err(e) =
                            schedule::set_next_run_time(&self.pool, None, "scheduler").await
                        {
                            tracing::error!(error = %e, "failed to clear one-shot run time");
                        }
                    }
                    // Arm the next interval tick now, so an overlapping tick
                    // during a long run is observed (and skipped).
                    self.write_next_due(Some(
                        now + chrono::Duration::seconds(config.interval_seconds),
                    ));

                    let scheduler = self.clone();
                    let interval = config.interval_seconds;
                    tokio::spawn(async move {
                        let _permit = permit;
                        scheduler.execute_run().await;
                        let finished = Utc::now();
                        scheduler
                            .write_next_due(Some(finished + chrono::Duration::seconds(interval)));
                        scheduler.write_last_run(Some(
                            finished.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                        ));
                    });
                }
                Err(_) => {
                    self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                    self.pipeline.metrics.scrape_ticks_skipped_total.inc();
                    tracing::warn!("scraper_job tick skipped: max_instances reached");

                    // Defer the interval tick; the in-flight run reschedules
                    // on completion. A skipped one-shot is consumed.
                    self.write_next_due(Some(
                        now + chrono::Duration::seconds(config.interval_seconds),
                    ));
                    if oneshot_due {
                        if let Err(e) =
                            schedule::set_next_run_time(&self.pool, None, "scheduler").await
                        {
                            tracing::error!(error = %e, "failed to clear one-shot run time");
                        }
                    }
                }
            }
        }
    }

    /// One scheduled scrape over the active follow list.
    async fn execute_run(&self) {
        let usernames = match storage::follows::active_usernames(&self.pool).await {
            Ok(usernames) => usernames,
            Err(e) => {
                tracing::error!(error = %e, "failed to load active follows");
                return;
            }
        };
        if usernames.is_empty() {
            tracing::info!("no active follows, skipping scheduled scrape");
            return;
        }

        let task_id = self.pipeline.registry.create(task_types::SCHEDULED_SCRAPE);
        let _ = self
            .pipeline
            .registry
            .update_status(&task_id, TaskStatus::Running, None, None);

        match self.pipeline.scrape_and_process(&usernames, None).await {
            Ok(result) => {
                tracing::info!(
                    users = result.total_users,
                    new_tweets = result.new_tweets,
                    elapsed_ms = result.elapsed_ms,
                    "scheduled scrape completed"
                );
                let payload = serde_json::to_value(&result).unwrap_or_default();
                let _ = self.pipeline.registry.update_status(
                    &task_id,
                    TaskStatus::Completed,
                    Some(payload),
                    None,
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "scheduled scrape failed");
                let _ = self.pipeline.registry.update_status(
                    &task_id,
                    TaskStatus::Failed,
                    None,
                    Some(e.to_string()),
                );
            }
        }
    }

    async fn current_interval(&self) -> Result<i64, SchedulerError> {
        Ok(schedule::get_schedule_config(&self.pool)
            .await?
            .map(|c| c.interval_seconds)
            .unwrap_or(crate::config::defaults::SCRAPER_INTERVAL_SECONDS))
    }

    fn read_next_due(&self) -> Option<DateTime<Utc>> {
        match self.next_due.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn write_next_due(&self, value: Option<DateTime<Utc>>) {
        match self.next_due.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    fn read_last_run(&self) -> Option<String> {
        match self.last_run_at.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn write_last_run(&self, value: Option<String>) {
        match self.last_run_at.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}
