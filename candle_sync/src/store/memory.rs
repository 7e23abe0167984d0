//! In-memory [`CandleStore`] with failure injection.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    series::{Candle, SeriesKey},
    store::{CandleStore, StoreError, StoreResult},
};

/// `BTreeMap`-backed store. Rows are keyed by open time per series.
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: HashMap<SeriesKey, BTreeMap<i64, Candle>>,
    failing_rows: BTreeSet<(SeriesKey, i64)>,
    failing_reads: BTreeSet<SeriesKey>,
    writes: usize,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of a series in open-time order.
    pub fn candles(&self, series: &SeriesKey) -> Vec<Candle> {
        self.series
            .get(series)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One row, if stored.
    pub fn get(&self, series: &SeriesKey, open_time: i64) -> Option<&Candle> {
        self.series.get(series)?.get(&open_time)
    }

    /// Total successful row writes since creation.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Makes every write of this row fail.
    pub fn fail_row(&mut self, series: &SeriesKey, open_time: i64) {
        self.failing_rows.insert((series.clone(), open_time));
    }

    /// Makes bulk key reads of this series fail until [`MemoryStore::heal`].
    pub fn fail_reads(&mut self, series: &SeriesKey) {
        self.failing_reads.insert(series.clone());
    }

    /// Clears every injected failure.
    pub fn heal(&mut self) {
        self.failing_rows.clear();
        self.failing_reads.clear();
    }
}

impl CandleStore for MemoryStore {
    fn existing(
        &mut self,
        series: &SeriesKey,
        since: Option<i64>,
    ) -> StoreResult<BTreeMap<i64, Candle>> {
        if self.failing_reads.contains(series) {
            return Err(StoreError::Injected(format!("read of {series}")));
        }
        let Some(rows) = self.series.get(series) else {
            return Ok(BTreeMap::new());
        };
        Ok(rows
            .range(since.unwrap_or(i64::MIN)..)
            .map(|(t, c)| (*t, c.clone()))
            .collect())
    }

    fn upsert(&mut self, series: &SeriesKey, candle: &Candle) -> StoreResult<()> {
        if self.failing_rows.contains(&(series.clone(), candle.open_time)) {
            return Err(StoreError::Injected(format!(
                "write of {series}@{}",
                candle.open_time
            )));
        }
        self.series
            .entry(series.clone())
            .or_default()
            .insert(candle.open_time, candle.clone());
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Mutation, MutationKind};

    fn candle(open_time: i64) -> Candle {
        Candle {
            open_time,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            tick_volume: 0,
            spread: 0,
            real_volume: 0,
            is_completed: true,
        }
    }

    #[test]
    fn default_apply_collects_row_failures() {
        let key = SeriesKey::parse("EURUSD", "M1").unwrap();
        let mut store = MemoryStore::new();
        store.fail_row(&key, 120);

        let batch: Vec<Mutation> = [60, 120, 180]
            .into_iter()
            .map(|t| Mutation {
                kind: MutationKind::Insert,
                candle: candle(t),
            })
            .collect();
        let result = store.apply(&key, &batch).unwrap();

        assert_eq!(result.applied(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].open_time, 120);
        assert_eq!(store.writes(), 2);
        assert!(store.get(&key, 120).is_none());
    }

    #[test]
    fn injected_read_failure() {
        let key = SeriesKey::parse("EURUSD", "M1").unwrap();
        let mut store = MemoryStore::new();
        store.fail_reads(&key);
        assert!(store.existing_keys(&key, None).is_err());
        store.heal();
        assert!(store.existing_keys(&key, None).unwrap().is_empty());
    }
}
