//! Singleton schedule configuration for the scraper job.

use super::{now_utc, DbPool};
use crate::error::StorageError;
use serde::Serialize;

/// The single persisted schedule row (`id = 1`).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ScheduleConfig {
    /// Always 1.
    pub id: i64,
    /// Scrape interval in seconds.
    pub interval_seconds: i64,
    /// Whether the scheduler is running.
    pub is_enabled: bool,
    /// One-shot next-run override, RFC 3339 UTC. Cleared after firing.
    pub next_run_time: Option<String>,
    /// Last modification time, RFC 3339 UTC.
    pub updated_at: String,
    /// Who performed the last modification.
    pub updated_by: Option<String>,
}

/// Read the schedule config. Returns `None` before first configuration.
pub async fn get_schedule_config(pool: &DbPool) -> Result<Option<ScheduleConfig>, StorageError> {
    sqlx::query_as::<_, ScheduleConfig>("SELECT * FROM scraper_schedule_config WHERE id = 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })
}

/// Insert the singleton row if absent, leaving an existing row untouched.
pub async fn ensure_schedule_config(
    pool: &DbPool,
    interval_seconds: i64,
    is_enabled: bool,
) -> Result<ScheduleConfig, StorageError> {
    sqlx::query(
        "INSERT OR IGNORE INTO scraper_schedule_config \
         (id, interval_seconds, is_enabled, next_run_time, updated_at, updated_by) \
         VALUES (1, ?, ?, NULL, ?, 'startup')",
    )
    .bind(interval_seconds)
    .bind(is_enabled)
    .bind(now_utc())
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    match get_schedule_config(pool).await? {
        Some(config) => Ok(config),
        None => Err(StorageError::Decode {
            message: "schedule config row missing after insert".to_string(),
        }),
    }
}

/// Update the interval.
pub async fn set_interval(
    pool: &DbPool,
    interval_seconds: i64,
    updated_by: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE scraper_schedule_config SET interval_seconds = ?, updated_at = ?, updated_by = ? WHERE id = 1",
    )
    .bind(interval_seconds)
    .bind(now_utc())
    .bind(updated_by)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}

/// Set or clear the one-shot next-run override.
pub async fn set_next_run_time(
    pool: &DbPool,
    next_run_time: Option<&str>,
    updated_by: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE scraper_schedule_config SET next_run_time = ?, updated_at = ?, updated_by = ? WHERE id = 1",
    )
    .bind(next_run_time)
    .bind(now_utc())
    .bind(updated_by)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}

/// Toggle the enabled flag.
pub async fn set_enabled(
    pool: &DbPool,
    is_enabled: bool,
    updated_by: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE scraper_schedule_config SET is_enabled = ?, updated_at = ?, updated_by = ? WHERE id = 1",
    )
    .bind(is_enabled)
    .bind(now_utc())
    .bind(updated_by)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}
