use std::time::Duration;

use candle_sync::{
    schedule::{
        Scheduler, SchedulerConfig, plan_series, retry::RetryPolicy, run_backfill,
    },
    series::SeriesKey,
    store::{CandleStore, memory::MemoryStore},
};
use market_data_ingestor::models::timeframe::NativeTimeframe;
use tokio_util::sync::CancellationToken;

mod common;

use common::{bars, harness};

fn pairs(instruments: &[&str], labels: &[&str]) -> (Vec<SeriesKey>, SchedulerConfig) {
    let plan = plan_series(
        &instruments.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        &labels.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    );
    let cfg = SchedulerConfig::for_granularities(&plan.granularities);
    (plan.series, cfg)
}

#[tokio::test(start_paused = true)]
async fn run_stops_at_cycle_boundary_when_cancelled() {
    let h = harness(MemoryStore::new(), 10_000);
    let (series, cfg) = pairs(&["EURUSD"], &["M1"]);
    assert_eq!(cfg.cycle_interval, Duration::from_secs(15));
    h.serve(&series[0], bars(9_000, 60, 5));
    let source = h.source.clone();

    let mut scheduler = Scheduler::new(h.reconciler, series.clone(), cfg);
    let stats = scheduler.stats_handle();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(40)).await;
        trigger.cancel();
    });

    let done = scheduler.run(cancel).await;
    // Cycles start at 0s, 15s and 30s; the sleep towards 45s is interrupted.
    assert_eq!(done.cycles, 3);
    assert_eq!(done.total_updates, 5);
    assert_eq!(source.fetch_calls(), 3);
    assert_eq!(stats.snapshot().cycles, 3);
    assert_eq!(scheduler.reconciler().store().candles(&series[0]).len(), 5);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_runs_no_cycle() {
    let h = harness(MemoryStore::new(), 10_000);
    let (series, cfg) = pairs(&["EURUSD"], &["M1"]);
    let mut scheduler = Scheduler::new(h.reconciler, series, cfg);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let done = scheduler.run(cancel).await;
    assert_eq!(done.cycles, 0);
}

#[tokio::test(start_paused = true)]
async fn failing_pair_backs_off_then_gives_up() {
    let h = harness(MemoryStore::new(), 10_000);
    let (series, mut cfg) = pairs(&["EURUSD", "GBPUSD"], &["M1"]);
    cfg.retry = RetryPolicy {
        max_consecutive_failures: Some(3),
        initial_backoff: Duration::from_secs(10),
        max_backoff: Duration::from_secs(60),
    };
    h.source.fail_next("EURUSD", NativeTimeframe::M1, 100);
    h.serve(&series[1], bars(9_000, 60, 2));
    let source = h.source.clone();
    let eurusd = series[0].clone();
    let gbpusd = series[1].clone();

    let mut scheduler = Scheduler::new(h.reconciler, series, cfg);

    let first = scheduler.run_cycle().await;
    assert_eq!((first.pairs_run, first.pair_failures, first.updates), (2, 1, 2));
    assert_eq!(scheduler.health(&eurusd).map(|p| p.consecutive_failures), Some(1));

    // Still inside the 10s backoff: only the healthy pair runs.
    let second = scheduler.run_cycle().await;
    assert_eq!((second.pairs_run, second.pairs_skipped), (1, 1));

    tokio::time::advance(Duration::from_secs(10)).await;
    let third = scheduler.run_cycle().await;
    assert_eq!(third.pair_failures, 1);

    // Backoff doubled to 20s.
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(scheduler.run_cycle().await.pairs_skipped, 1);
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(scheduler.run_cycle().await.pair_failures, 1);
    assert!(scheduler.health(&eurusd).is_some_and(|p| p.disabled));

    tokio::time::advance(Duration::from_secs(3600)).await;
    let parked = scheduler.run_cycle().await;
    assert_eq!((parked.pairs_run, parked.pairs_skipped), (1, 1));
    assert_eq!(source.fetch_calls(), 3 + 6);
    assert!(scheduler.health(&gbpusd).is_some_and(|p| p.consecutive_failures == 0));
    assert_eq!(scheduler.stats().total_pair_failures, 3);
}

#[tokio::test(start_paused = true)]
async fn pair_recovers_after_one_failure() {
    let h = harness(MemoryStore::new(), 10_000);
    let (series, cfg) = pairs(&["EURUSD"], &["M1"]);
    h.source.fail_next("EURUSD", NativeTimeframe::M1, 1);
    h.serve(&series[0], bars(9_000, 60, 3));
    let key = series[0].clone();

    let mut scheduler = Scheduler::new(h.reconciler, series, cfg);
    assert_eq!(scheduler.run_cycle().await.pair_failures, 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    let report = scheduler.run_cycle().await;
    assert_eq!((report.pair_failures, report.updates), (0, 3));
    assert!(
        scheduler
            .health(&key)
            .is_some_and(|p| p.consecutive_failures == 0 && p.next_attempt.is_none())
    );
}

#[test]
fn unknown_timeframes_are_skipped() {
    let plan = plan_series(
        &["EURUSD".to_string()],
        &["M1".to_string(), "M2".to_string(), "X9".to_string()],
    );
    assert_eq!(plan.series.len(), 2);
    assert_eq!(plan.skipped, vec!["X9".to_string()]);

    let none = plan_series(&["EURUSD".to_string()], &["bogus".to_string()]);
    assert!(none.series.is_empty());
    assert_eq!(
        SchedulerConfig::for_granularities(&none.granularities).cycle_interval,
        Duration::from_secs(60)
    );
}

#[tokio::test(start_paused = true)]
async fn backfill_runs_each_pair_and_reports_failures() {
    let mut h = harness(MemoryStore::new(), 1_000_000);
    let (series, _) = pairs(&["EURUSD", "GBPUSD"], &["M1", "H1"]);
    h.serve(&series[0], bars(60_000, 60, 20));
    h.serve(&series[1], bars(3_600, 3_600, 10));
    h.source.mark_unavailable("GBPUSD");

    let cancel = CancellationToken::new();
    let summary = run_backfill(&mut h.reconciler, &series, Duration::from_secs(1), &cancel).await;

    assert_eq!(summary.pairs.len(), 4);
    assert_eq!(summary.total_inserted(), 19 + 9);
    assert_eq!(summary.failed(), 2);
    assert!(summary.pairs[2].error.as_deref().is_some_and(|e| e.contains("GBPUSD")));
    assert!(
        h.reconciler
            .store_mut()
            .existing(&series[1], None)
            .unwrap()
            .values()
            .all(|c| c.is_completed)
    );
}

#[tokio::test(start_paused = true)]
async fn backfill_honors_cancellation_between_pairs() {
    let mut h = harness(MemoryStore::new(), 1_000_000);
    let (series, _) = pairs(&["EURUSD", "GBPUSD"], &["M1"]);
    h.serve(&series[0], bars(60_000, 60, 5));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let summary = run_backfill(&mut h.reconciler, &series, Duration::from_secs(5), &cancel).await;
    assert_eq!(summary.pairs.len(), 1);
    assert_eq!(summary.total_inserted(), 4);
}
