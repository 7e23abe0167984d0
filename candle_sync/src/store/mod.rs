//! Store adapter: durable candle storage keyed by `(instrument, granularity, open_time)`.
//!
//! ## What this does
//! - [`CandleStore::existing`] loads the stored rows of one series from a given open time
//!   on, in a single bulk read; [`CandleStore::existing_keys`] is its
//!   `open_time -> is_completed` projection.
//! - [`CandleStore::upsert`] inserts or replaces a single candle by key.
//! - [`CandleStore::apply`] writes a planned batch and reports per-row failures in a
//!   [`BatchResult`] instead of aborting on the first bad row.
//!
//! Series are created by their first row and never deleted here.
//!
//! Implementations: [`sqlite::SqliteStore`] (diesel) and [`memory::MemoryStore`].
//! Read-only projections for the query side live in [`query`].

pub mod memory;
pub mod query;
pub mod sqlite;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::series::{Candle, SeriesKey};

/// Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A query or statement failed.
    #[error("database error: {0}")]
    Diesel(#[from] diesel::result::Error),

    /// The database could not be opened or prepared.
    #[error("database unavailable: {0:#}")]
    Connection(anyhow::Error),

    /// Failure injected by [`memory::MemoryStore`].
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Whether a planned write creates a row or refreshes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Open time absent from the store.
    Insert,
    /// Open time present, stored incomplete, and something changed.
    Update,
}

/// One planned row write.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Insert or update.
    pub kind: MutationKind,
    /// Full row values.
    pub candle: Candle,
}

/// A row that could not be written.
#[derive(Debug)]
pub struct RowFailure {
    /// Key of the failed row.
    pub open_time: i64,
    /// What was attempted.
    pub kind: MutationKind,
    /// Why it failed.
    pub error: StoreError,
}

/// Outcome of [`CandleStore::apply`].
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Rows inserted.
    pub inserted: usize,
    /// Rows updated in place.
    pub updated: usize,
    /// Rows that failed; the rest of the batch was still applied.
    pub failures: Vec<RowFailure>,
}

impl BatchResult {
    /// Successful writes of either kind.
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }

    fn record(&mut self, m: &Mutation, outcome: StoreResult<()>) {
        match outcome {
            Ok(()) => match m.kind {
                MutationKind::Insert => self.inserted += 1,
                MutationKind::Update => self.updated += 1,
            },
            Err(error) => self.failures.push(RowFailure {
                open_time: m.candle.open_time,
                kind: m.kind,
                error,
            }),
        }
    }
}

/// Durable candle storage.
pub trait CandleStore {
    /// Bulk read of the stored rows of a series keyed by open time, restricted to
    /// `open_time >= since` when given. Unknown series yield an empty map.
    fn existing(&mut self, series: &SeriesKey, since: Option<i64>)
    -> StoreResult<BTreeMap<i64, Candle>>;

    /// `open_time -> is_completed` for the same rows as [`CandleStore::existing`].
    fn existing_keys(
        &mut self,
        series: &SeriesKey,
        since: Option<i64>,
    ) -> StoreResult<BTreeMap<i64, bool>> {
        Ok(self
            .existing(series, since)?
            .into_iter()
            .map(|(t, c)| (t, c.is_completed))
            .collect())
    }

    /// Inserts the candle, or replaces every mutable column if its key exists.
    fn upsert(&mut self, series: &SeriesKey, candle: &Candle) -> StoreResult<()>;

    /// Applies a batch row by row, collecting per-row failures.
    ///
    /// `Err` is reserved for failures that prevent the batch from running at all.
    fn apply(&mut self, series: &SeriesKey, mutations: &[Mutation]) -> StoreResult<BatchResult> {
        let mut result = BatchResult::default();
        for m in mutations {
            let outcome = self.upsert(series, &m.candle);
            result.record(m, outcome);
        }
        Ok(result)
    }
}
