//! Poll-interval policy.
//!
//! The cycle interval is a quarter of the finest configured period, clamped to
//! `[50ms, 60s]`, so bar closes are noticed shortly after they happen without
//! polling faster than the source can usefully answer.

use std::time::Duration;

use crate::granularity::Granularity;

/// Shortest interval and shortest sleep between cycles.
pub const MIN_INTERVAL: Duration = Duration::from_millis(50);
/// Longest interval between cycles (also the interval with nothing configured).
pub const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// `clamp(finest_period / 4, 50ms, 60s)`; 60s when `granularities` is empty.
pub fn cycle_interval(granularities: &[Granularity]) -> Duration {
    let Some(finest) = granularities.iter().map(|g| g.period_seconds()).min() else {
        return MAX_INTERVAL;
    };
    let quarter = Duration::from_secs_f64(finest.max(0) as f64 / 4.0);
    quarter.clamp(MIN_INTERVAL, MAX_INTERVAL)
}

/// Sleep after a cycle that took `elapsed`: `max(min_sleep, interval - elapsed)`.
pub fn sleep_after(interval: Duration, elapsed: Duration, min_sleep: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(min_sleep)
}
