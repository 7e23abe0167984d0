//! Reconciliation scheduler.
//!
//! ## What this does
//! - Expands configured instruments × granularity labels into series keys; unknown labels
//!   are skipped with a warning ([`plan_series`]).
//! - Runs cycles: every due pair is reconciled once, sequentially ([`Scheduler::run_cycle`]).
//! - Sleeps `max(50ms, interval - elapsed)` between cycles, where the interval follows
//!   [`interval::cycle_interval`].
//! - Stops when the [`CancellationToken`] fires. The token is checked between cycles and
//!   interrupts the sleep; a cycle that has started finishes every pair first.
//! - Failing pairs back off per [`retry::RetryPolicy`] and may be parked for the run.
//!
//! [`run_backfill`] is the one-shot counterpart used for historical loads.

pub mod interval;
pub mod retry;
pub mod stats;

use std::{collections::HashMap, time::Duration};

use indexmap::IndexSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    granularity::{Granularity, lookup},
    series::SeriesKey,
    store::CandleStore,
    sync::{ReconcilePolicy, Reconciler},
};

use self::{
    interval::{MIN_INTERVAL, cycle_interval, sleep_after},
    retry::{PairHealth, RetryDecision, RetryPolicy},
    stats::{CycleReport, SchedulerStats, StatsHandle},
};

/// Result of expanding the configured matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesPlan {
    /// Pairs to reconcile, instrument-major.
    pub series: Vec<SeriesKey>,
    /// Distinct granularities in use.
    pub granularities: Vec<Granularity>,
    /// Labels the catalog did not know.
    pub skipped: Vec<String>,
}

/// Cross product of `instruments` and `labels`, skipping unknown labels.
pub fn plan_series(instruments: &[String], labels: &[String]) -> SeriesPlan {
    let mut granularities: IndexSet<Granularity> = IndexSet::new();
    let mut skipped = Vec::new();
    for label in labels {
        match lookup(label) {
            Ok(g) => {
                granularities.insert(g);
            }
            Err(e) => {
                warn!(%label, error = %e, "skipping unknown timeframe");
                skipped.push(label.clone());
            }
        }
    }

    let series = instruments
        .iter()
        .flat_map(|i| granularities.iter().map(move |g| SeriesKey::new(i.clone(), *g)))
        .collect();

    SeriesPlan {
        series,
        granularities: granularities.into_iter().collect(),
        skipped,
    }
}

/// Loop timing and failure handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Target time between cycle starts.
    pub cycle_interval: Duration,
    /// Floor on the sleep between cycles.
    pub min_sleep: Duration,
    /// Log aggregate statistics every this many cycles (0 disables).
    pub stats_every: u64,
    /// Backoff for failing pairs.
    pub retry: RetryPolicy,
}

impl SchedulerConfig {
    /// Defaults with the interval derived from `granularities`.
    pub fn for_granularities(granularities: &[Granularity]) -> Self {
        Self {
            cycle_interval: cycle_interval(granularities),
            min_sleep: MIN_INTERVAL,
            stats_every: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives live reconciliation across a fixed set of series.
pub struct Scheduler<S> {
    reconciler: Reconciler<S>,
    series: Vec<SeriesKey>,
    config: SchedulerConfig,
    health: HashMap<SeriesKey, PairHealth>,
    stats: SchedulerStats,
    handle: StatsHandle,
}

impl<S: CandleStore> Scheduler<S> {
    /// Scheduler over `series`; nothing runs until [`Scheduler::run`] or [`Scheduler::run_cycle`].
    pub fn new(reconciler: Reconciler<S>, series: Vec<SeriesKey>, config: SchedulerConfig) -> Self {
        Self {
            reconciler,
            series,
            config,
            health: HashMap::new(),
            stats: SchedulerStats::default(),
            handle: StatsHandle::default(),
        }
    }

    /// Reader for statistics, usable from other tasks while [`Scheduler::run`] is going.
    pub fn stats_handle(&self) -> StatsHandle {
        self.handle.clone()
    }

    /// Totals so far.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Loop settings.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Failure state of a pair, if it has ever failed.
    pub fn health(&self, series: &SeriesKey) -> Option<&PairHealth> {
        self.health.get(series)
    }

    /// The reconciler driven by this scheduler.
    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    /// Reconciles every due pair once.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        for series in &self.series {
            let health = self.health.entry(series.clone()).or_default();
            if !health.is_due(Instant::now()) {
                report.pairs_skipped += 1;
                continue;
            }

            report.pairs_run += 1;
            match self.reconciler.reconcile(series, ReconcilePolicy::live()).await {
                Ok(r) => {
                    health.record_success();
                    report.updates += r.updated_count();
                    report.row_failures += r.failures.len();
                }
                Err(e) => {
                    report.pair_failures += 1;
                    match health.record_failure(&self.config.retry, Instant::now()) {
                        RetryDecision::RetryAfter(delay) => warn!(
                            %series,
                            error = %e,
                            failures = health.consecutive_failures,
                            retry_in = ?delay,
                            "reconciliation failed"
                        ),
                        RetryDecision::GiveUp => error!(
                            %series,
                            error = %e,
                            failures = health.consecutive_failures,
                            "reconciliation keeps failing; pair disabled for this run"
                        ),
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        self.stats.record(&report);
        self.handle.publish(self.stats.clone());
        report
    }

    /// Runs cycles until `cancel` fires; returns the final statistics.
    pub async fn run(&mut self, cancel: CancellationToken) -> SchedulerStats {
        info!(
            pairs = self.series.len(),
            interval = ?self.config.cycle_interval,
            "scheduler started"
        );

        while !cancel.is_cancelled() {
            let report = self.run_cycle().await;
            if report.updates > 0 {
                info!(
                    cycle = self.stats.cycles,
                    updates = report.updates,
                    elapsed = ?report.elapsed,
                    "cycle complete"
                );
            }
            if self.config.stats_every > 0 && self.stats.cycles % self.config.stats_every == 0 {
                info!(
                    cycles = self.stats.cycles,
                    avg_cycle = ?self.stats.avg_cycle_time(),
                    total_updates = self.stats.total_updates,
                    pair_failures = self.stats.total_pair_failures,
                    "scheduler stats"
                );
            }

            let pause = sleep_after(
                self.config.cycle_interval,
                report.elapsed,
                self.config.min_sleep,
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(cycles = self.stats.cycles, "scheduler stopped");
        self.stats.clone()
    }
}

/// Per-pair outcome of a backfill pass.
#[derive(Debug)]
pub struct BackfillOutcome {
    /// Pair loaded.
    pub series: SeriesKey,
    /// Bars the source returned.
    pub fetched: usize,
    /// Rows appended.
    pub inserted: usize,
    /// Failure message, if the pair failed.
    pub error: Option<String>,
}

/// Totals of a backfill pass.
#[derive(Debug, Default)]
pub struct BackfillSummary {
    /// One entry per pair attempted.
    pub pairs: Vec<BackfillOutcome>,
}

impl BackfillSummary {
    /// Rows appended across all pairs.
    pub fn total_inserted(&self) -> usize {
        self.pairs.iter().map(|p| p.inserted).sum()
    }

    /// Pairs that failed.
    pub fn failed(&self) -> usize {
        self.pairs.iter().filter(|p| p.error.is_some()).count()
    }
}

/// Loads history for each pair with [`ReconcilePolicy::backfill`], pausing between pairs.
///
/// Cancellation is honored between pairs.
pub async fn run_backfill<S: CandleStore>(
    reconciler: &mut Reconciler<S>,
    series: &[SeriesKey],
    pause: Duration,
    cancel: &CancellationToken,
) -> BackfillSummary {
    let mut summary = BackfillSummary::default();

    for (idx, key) in series.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(remaining = series.len() - idx, "backfill cancelled");
            break;
        }
        if idx > 0 && !pause.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(remaining = series.len() - idx, "backfill cancelled");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        let outcome = match reconciler.reconcile(key, ReconcilePolicy::backfill()).await {
            Ok(r) => {
                info!(series = %key, fetched = r.fetched, inserted = r.inserted, "backfilled");
                BackfillOutcome {
                    series: key.clone(),
                    fetched: r.fetched,
                    inserted: r.inserted,
                    error: None,
                }
            }
            Err(e) => {
                error!(series = %key, error = %e, "backfill failed");
                BackfillOutcome {
                    series: key.clone(),
                    fetched: 0,
                    inserted: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        summary.pairs.push(outcome);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_skips_unknown_labels() {
        let plan = plan_series(
            &["EURUSD".to_string(), "XAUUSD".to_string()],
            &["M1".to_string(), "M7".to_string(), "H1".to_string(), "M1".to_string()],
        );
        assert_eq!(plan.skipped, vec!["M7".to_string()]);
        assert_eq!(plan.granularities.len(), 2);
        let names: Vec<String> = plan.series.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["EURUSD/M1", "EURUSD/H1", "XAUUSD/M1", "XAUUSD/H1"]);
    }

    #[test]
    fn config_follows_finest_granularity() {
        let plan = plan_series(&["EURUSD".to_string()], &["H1".to_string(), "M1".to_string()]);
        let cfg = SchedulerConfig::for_granularities(&plan.granularities);
        assert_eq!(cfg.cycle_interval, Duration::from_secs(15));
        assert_eq!(cfg.stats_every, 10);
    }
}
