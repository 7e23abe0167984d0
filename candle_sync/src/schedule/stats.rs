//! Scheduler statistics, published lock-free for other tasks to read.

use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;

/// Outcome of one pass over every pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Pairs reconciled (successfully or not).
    pub pairs_run: usize,
    /// Pairs skipped because they were backing off or disabled.
    pub pairs_skipped: usize,
    /// Rows inserted or updated.
    pub updates: usize,
    /// Pairs whose reconciliation failed.
    pub pair_failures: usize,
    /// Individual rows the store refused.
    pub row_failures: usize,
    /// Wall time spent in the cycle.
    pub elapsed: Duration,
}

/// Running totals since the scheduler started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Completed cycles.
    pub cycles: u64,
    /// Rows inserted or updated.
    pub total_updates: u64,
    /// Failed pair reconciliations.
    pub total_pair_failures: u64,
    /// Refused rows.
    pub total_row_failures: u64,
    /// Sum of cycle wall times.
    pub total_cycle_time: Duration,
    /// Most recent cycle.
    pub last_cycle: Option<CycleReport>,
}

impl SchedulerStats {
    /// Folds one cycle into the totals.
    pub fn record(&mut self, cycle: &CycleReport) {
        self.cycles += 1;
        self.total_updates += cycle.updates as u64;
        self.total_pair_failures += cycle.pair_failures as u64;
        self.total_row_failures += cycle.row_failures as u64;
        self.total_cycle_time += cycle.elapsed;
        self.last_cycle = Some(cycle.clone());
    }

    /// Mean cycle wall time; zero before the first cycle.
    pub fn avg_cycle_time(&self) -> Duration {
        match u32::try_from(self.cycles) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_cycle_time / n,
            Err(_) => {
                Duration::from_secs_f64(self.total_cycle_time.as_secs_f64() / self.cycles as f64)
            }
        }
    }
}

/// Cheap, cloneable reader of the latest [`SchedulerStats`].
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<ArcSwap<SchedulerStats>>,
}

impl StatsHandle {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SchedulerStats> {
        self.inner.load_full()
    }

    pub(crate) fn publish(&self, stats: SchedulerStats) {
        self.inner.store(Arc::new(stats));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_over_cycles() {
        let mut s = SchedulerStats::default();
        assert_eq!(s.avg_cycle_time(), Duration::ZERO);
        for ms in [100, 300] {
            s.record(&CycleReport {
                updates: 2,
                elapsed: Duration::from_millis(ms),
                ..Default::default()
            });
        }
        assert_eq!(s.cycles, 2);
        assert_eq!(s.total_updates, 4);
        assert_eq!(s.avg_cycle_time(), Duration::from_millis(200));
    }

    #[test]
    fn handle_sees_published_snapshot() {
        let h = StatsHandle::default();
        let reader = h.clone();
        h.publish(SchedulerStats {
            cycles: 7,
            ..Default::default()
        });
        assert_eq!(reader.snapshot().cycles, 7);
    }
}
