//! Adaptive fetch limit calculation.
//!
//! Pure functions over per-username fetch statistics. The next limit is
//! predicted from an EMA of the recent new-tweet yield, doubled when the
//! last fetch saturated, and shrunk to the floor after repeated empty
//! fetches.

use crate::storage::fetch_stats::FetchStats;

/// Tuning knobs for the limit calculation.
#[derive(Debug, Clone, Copy)]
pub struct LimitParams {
    /// Limit used when no stats exist yet.
    pub default_limit: u32,
    /// Lower clamp.
    pub min_limit: u32,
    /// Upper clamp.
    pub max_limit: u32,
    /// EMA smoothing factor for the new-tweet rate.
    pub alpha: f64,
    /// Overshoot factor applied to the prediction.
    pub safety_margin: f64,
}

impl Default for LimitParams {
    fn default() -> Self {
        Self {
            default_limit: crate::config::defaults::DEFAULT_FETCH_LIMIT,
            min_limit: crate::config::defaults::MIN_FETCH_LIMIT,
            max_limit: crate::config::defaults::MAX_FETCH_LIMIT,
            alpha: crate::config::defaults::NEW_RATE_ALPHA,
            safety_margin: crate::config::defaults::FETCH_SAFETY_MARGIN,
        }
    }
}

/// Number of consecutive empty fetches after which the limit drops to the floor.
const EMPTY_FETCH_SHRINK_THRESHOLD: i64 = 3;

/// Compute the next fetch limit for a username.
///
/// Rules, in order:
/// 1. No prior stats: the default limit.
/// 2. Last fetch saturated (every fetched tweet was new): double it.
/// 3. Three or more consecutive empty fetches: the floor.
/// 4. Otherwise: predicted yield with a safety margin, clamped.
pub fn next_limit(stats: Option<&FetchStats>, params: &LimitParams) -> u32 {
    let Some(stats) = stats else {
        return params.default_limit;
    };

    if stats.last_fetched_count > 0 && stats.last_new_count == stats.last_fetched_count {
        let doubled = (stats.last_fetched_count as u64).saturating_mul(2);
        return u32::try_from(doubled.min(u64::from(params.max_limit)))
            .unwrap_or(params.max_limit);
    }

    if stats.consecutive_empty_fetches >= EMPTY_FETCH_SHRINK_THRESHOLD {
        return params.min_limit;
    }

    let predicted =
        (stats.last_fetched_count as f64) * stats.avg_new_rate * params.safety_margin;
    let rounded = predicted.round().max(0.0) as u32;
    rounded.clamp(params.min_limit, params.max_limit)
}

/// Fold a completed fetch into the running statistics.
///
/// `fetched` is how many tweets the provider returned; `new` how many were
/// previously unseen. The EMA only moves when something was fetched.
pub fn updated_stats(
    previous: Option<&FetchStats>,
    username: &str,
    fetched: i64,
    new: i64,
    params: &LimitParams,
) -> FetchStats {
    let (prev_rate, prev_total, prev_empty) = previous
        .map(|s| (s.avg_new_rate, s.total_fetches, s.consecutive_empty_fetches))
        .unwrap_or((0.0, 0, 0));

    let avg_new_rate = if fetched > 0 {
        let current_rate = (new as f64 / fetched as f64).clamp(0.0, 1.0);
        params.alpha * current_rate + (1.0 - params.alpha) * prev_rate
    } else {
        prev_rate
    };

    let consecutive_empty_fetches = if new > 0 { 0 } else { prev_empty + 1 };

    FetchStats {
        username: username.to_string(),
        last_fetch_at: Some(crate::storage::now_utc()),
        last_fetched_count: fetched,
        last_new_count: new,
        total_fetches: prev_total + 1,
        avg_new_rate,
        consecutive_empty_fetches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(fetched: i64, new: i64, rate: f64, empty: i64) -> FetchStats {
        FetchStats {
            username: "alice".to_string(),
            last_fetch_at: None,
            last_fetched_count: fetched,
            last_new_count: new,
            total_fetches: 1,
            avg_new_rate: rate,
            consecutive_empty_fetches: empty,
        }
    }

    #[test]
    fn no_stats_uses_default() {
        assert_eq!(next_limit(None, &LimitParams::default()), 100);
    }

    #[test]
    fn saturation_doubles() {
        // 50 fetched, 50 new: we ran out of room, ask for 100.
        let s = stats(50, 50, 1.0, 0);
        assert_eq!(next_limit(Some(&s), &LimitParams::default()), 100);
    }

    #[test]
    fn saturation_doubling_respects_max() {
        let s = stats(200, 200, 1.0, 0);
        assert_eq!(next_limit(Some(&s), &LimitParams::default()), 300);
    }

    #[test]
    fn empty_streak_shrinks_to_floor() {
        let s = stats(100, 0, 0.5, 3);
        assert_eq!(next_limit(Some(&s), &LimitParams::default()), 10);
    }

    #[test]
    fn two_empty_fetches_do_not_shrink() {
        let s = stats(100, 0, 0.5, 2);
        // Prediction path: 100 * 0.5 * 1.2 = 60.
        assert_eq!(next_limit(Some(&s), &LimitParams::default()), 60);
    }

    #[test]
    fn prediction_clamps_low() {
        let s = stats(20, 1, 0.05, 0);
        // 20 * 0.05 * 1.2 = 1.2 → clamped to 10.
        assert_eq!(next_limit(Some(&s), &LimitParams::default()), 10);
    }

    #[test]
    fn prediction_clamps_high() {
        let s = stats(1000, 500, 0.9, 0);
        // 1000 * 0.9 * 1.2 = 1080 → clamped to 300.
        assert_eq!(next_limit(Some(&s), &LimitParams::default()), 300);
    }

    #[test]
    fn zero_fetched_with_no_streak_predicts_floor() {
        let s = stats(0, 0, 0.8, 1);
        assert_eq!(next_limit(Some(&s), &LimitParams::default()), 10);
    }

    #[test]
    fn update_applies_ema() {
        let prev = stats(100, 50, 0.4, 0);
        let updated = updated_stats(Some(&prev), "alice", 50, 25, &LimitParams::default());
        // current_rate = 0.5, ema = 0.3 * 0.5 + 0.7 * 0.4 = 0.43
        assert!((updated.avg_new_rate - 0.43).abs() < 1e-9);
        assert_eq!(updated.last_fetched_count, 50);
        assert_eq!(updated.last_new_count, 25);
        assert_eq!(updated.total_fetches, 2);
        assert_eq!(updated.consecutive_empty_fetches, 0);
        assert!(updated.last_fetch_at.is_some());
    }

    #[test]
    fn update_first_fetch() {
        let updated = updated_stats(None, "alice", 3, 3, &LimitParams::default());
        // No prior rate: ema = 0.3 * 1.0 + 0.7 * 0.0 = 0.3
        assert!((updated.avg_new_rate - 0.3).abs() < 1e-9);
        assert_eq!(updated.total_fetches, 1);
        assert_eq!(updated.consecutive_empty_fetches, 0);
    }

    #[test]
    fn update_empty_fetch_increments_streak() {
        let prev = stats(50, 10, 0.3, 1);
        let updated = updated_stats(Some(&prev), "alice", 20, 0, &LimitParams::default());
        assert_eq!(updated.consecutive_empty_fetches, 2);
        // Rate still moves: current_rate = 0.
        assert!((updated.avg_new_rate - 0.21).abs() < 1e-9);
    }

    #[test]
    fn update_zero_fetched_keeps_rate() {
        let prev = stats(50, 10, 0.3, 0);
        let updated = updated_stats(Some(&prev), "alice", 0, 0, &LimitParams::default());
        assert!((updated.avg_new_rate - 0.3).abs() < 1e-9);
        assert_eq!(updated.consecutive_empty_fetches, 1);
    }

    #[test]
    fn rate_stays_in_unit_interval() {
        // Provider claims more new than fetched; rate clamps at 1.
        let updated = updated_stats(None, "alice", 5, 50, &LimitParams::default());
        assert!(updated.avg_new_rate <= 1.0);
    }
}
