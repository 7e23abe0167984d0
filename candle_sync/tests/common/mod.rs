#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use candle_sync::{
    completion::ManualClock,
    db::{connection, migrate},
    series::SeriesKey,
    store::CandleStore,
    sync::{ReconcileOptions, Reconciler},
};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use market_data_ingestor::{models::bar::RawBar, providers::memory::MemorySource};
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn eurusd_m1() -> SeriesKey {
    SeriesKey::parse("EURUSD", "M1").unwrap()
}

/// Bar with a tiny range around `close`, so `high >= low` holds.
pub fn bar(open_time: i64, close: f64) -> RawBar {
    RawBar {
        open: close,
        high: close + 0.001,
        low: close - 0.001,
        tick_volume: 10,
        ..RawBar::flat(open_time, close)
    }
}

/// `count` consecutive bars of `period` seconds starting at `first`.
pub fn bars(first: i64, period: i64, count: usize) -> Vec<RawBar> {
    (0..count as i64)
        .map(|i| bar(first + i * period, 1.0 + i as f64 * 0.0001))
        .collect()
}

pub struct Harness<S> {
    pub source: Arc<MemorySource>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler<S>,
}

pub fn harness<S: CandleStore>(store: S, now: i64) -> Harness<S> {
    let source = Arc::new(MemorySource::new());
    let clock = Arc::new(ManualClock::new(now));
    let reconciler = Reconciler::new(
        source.clone(),
        store,
        clock.clone(),
        ReconcileOptions::default(),
    );
    Harness {
        source,
        clock,
        reconciler,
    }
}

impl<S: CandleStore> Harness<S> {
    pub fn serve(&self, series: &SeriesKey, bars: Vec<RawBar>) {
        self.source
            .set_bars(series.instrument(), series.granularity().native(), bars);
    }
}
