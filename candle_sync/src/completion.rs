//! Completion oracle and reference clocks.
//!
//! A bar opened at `T` with a period of `G` seconds is complete once the reference time
//! `R` satisfies `R >= T + G` (the boundary itself counts as complete). The reference time
//! is sampled once per reconciliation so every bar in a window is judged against the
//! same instant.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Decides whether a bar's period has fully elapsed.
///
/// An unknown period (`None`) is reported as complete. That path is a degraded mode:
/// such bars are never revisited for completion changes.
pub fn is_complete(open_time: i64, period_seconds: Option<i64>, reference_time: i64) -> bool {
    match period_seconds {
        Some(period) => reference_time >= open_time.saturating_add(period),
        None => true,
    }
}

/// Source of the reconciliation reference time, in epoch seconds UTC.
pub trait Clock: Send + Sync {
    /// Current reference time.
    fn now_epoch_seconds(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Clock frozen at `now`.
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Moves the clock to `now` (backwards allowed, to simulate skew).
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
