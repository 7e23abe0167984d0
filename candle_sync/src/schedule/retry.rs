//! Retry policy for failing pairs.
//!
//! A failed pair is normally retried on the next cycle anyway; the policy adds an
//! exponential backoff on top and an optional ceiling after which the pair is parked
//! for the rest of the run.

use std::time::Duration;

use tokio::time::Instant;

/// Backoff curve and attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures after which a pair is given up on; `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Cap on the doubling delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: None,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Verdict after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Skip the pair until the delay has passed.
    RetryAfter(Duration),
    /// Stop scheduling the pair.
    GiveUp,
}

impl RetryPolicy {
    /// Decision after the `failures`-th consecutive failure (1-based).
    pub fn delay_after(&self, failures: u32) -> RetryDecision {
        if let Some(max) = self.max_consecutive_failures {
            if failures >= max {
                return RetryDecision::GiveUp;
            }
        }
        let exp = failures.saturating_sub(1).min(31);
        let delay = self
            .initial_backoff
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff);
        RetryDecision::RetryAfter(delay)
    }
}

/// Failure bookkeeping for one pair.
#[derive(Debug, Clone, Default)]
pub struct PairHealth {
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Earliest instant the pair may run again.
    pub next_attempt: Option<Instant>,
    /// Set once the policy gave up.
    pub disabled: bool,
}

impl PairHealth {
    /// Whether the pair should run at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        !self.disabled && self.next_attempt.is_none_or(|at| now >= at)
    }

    /// Clears failure state.
    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    /// Counts a failure and applies the policy's verdict.
    pub fn record_failure(&mut self, policy: &RetryPolicy, now: Instant) -> RetryDecision {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let decision = policy.delay_after(self.consecutive_failures);
        match decision {
            RetryDecision::RetryAfter(d) => self.next_attempt = Some(now + d),
            RetryDecision::GiveUp => self.disabled = true,
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_consecutive_failures: None,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        };
        let delays: Vec<_> = (1..=5).map(|n| p.delay_after(n)).collect();
        assert_eq!(
            delays,
            vec![
                RetryDecision::RetryAfter(Duration::from_secs(1)),
                RetryDecision::RetryAfter(Duration::from_secs(2)),
                RetryDecision::RetryAfter(Duration::from_secs(4)),
                RetryDecision::RetryAfter(Duration::from_secs(5)),
                RetryDecision::RetryAfter(Duration::from_secs(5)),
            ]
        );
        assert_eq!(p.delay_after(u32::MAX), RetryDecision::RetryAfter(Duration::from_secs(5)));
    }

    #[test]
    fn ceiling_gives_up() {
        let p = RetryPolicy {
            max_consecutive_failures: Some(3),
            ..RetryPolicy::default()
        };
        assert!(matches!(p.delay_after(2), RetryDecision::RetryAfter(_)));
        assert_eq!(p.delay_after(3), RetryDecision::GiveUp);
    }

    #[test]
    fn health_tracks_due_time() {
        let p = RetryPolicy::default();
        let now = Instant::now();
        let mut h = PairHealth::default();
        assert!(h.is_due(now));

        h.record_failure(&p, now);
        assert!(!h.is_due(now));
        assert!(h.is_due(now + Duration::from_secs(1)));

        h.record_success();
        assert_eq!(h.consecutive_failures, 0);
        assert!(h.is_due(now));
    }
}
