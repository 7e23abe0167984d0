//! Series reconciliation.
//!
//! ## What this does
//! For one (instrument, granularity) pair:
//! 1. activates the instrument and fetches the latest window, both under one timeout;
//! 2. normalizes the window (ascending, unique open times) and applies the policy's
//!    `drop_last_bar`;
//! 3. samples **one** reference time and computes every bar's completion against it;
//! 4. reads the stored rows from the window's first open time on, in a single bulk query;
//! 5. plans a [`diff::SeriesDiff`] and hands the writes to the store as one batch.
//!
//! Completed rows are never rewritten, and an incomplete row is only rewritten when the
//! fetched bar differs from it. The live and backfill variants are the same
//! algorithm under different [`ReconcilePolicy`] values.

pub mod diff;
pub mod window;

use std::{sync::Arc, time::Duration};

use market_data_ingestor::{
    models::bar::RawBar,
    providers::{ProviderError, QuoteSource},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    completion::{Clock, is_complete},
    granularity::GranularityError,
    series::{Candle, SeriesKey},
    store::{CandleStore, RowFailure, StoreError},
    sync::window::{DuplicatePolicy, WindowError, normalize_window},
};

/// Reconciliation failures for one pair. None of them stop the scheduler.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration named a granularity the catalog does not know.
    #[error(transparent)]
    UnknownGranularity(#[from] GranularityError),

    /// The instrument could not be activated or the fetch failed.
    #[error("source unavailable for {series}: {source}")]
    SourceUnavailable {
        /// Pair being reconciled.
        series: SeriesKey,
        /// Source error.
        source: ProviderError,
    },

    /// Activation plus fetch exceeded the configured timeout.
    #[error("fetch for {series} timed out after {timeout:?}")]
    FetchTimeout {
        /// Pair being reconciled.
        series: SeriesKey,
        /// Configured limit.
        timeout: Duration,
    },

    /// The fetched window violated the duplicate policy.
    #[error("invalid window for {series}: {source}")]
    InvalidWindow {
        /// Pair being reconciled.
        series: SeriesKey,
        /// Normalization error.
        source: WindowError,
    },

    /// The bulk read or the batch itself failed.
    #[error("store error for {series}: {source}")]
    Store {
        /// Pair being reconciled.
        series: SeriesKey,
        /// Store error.
        source: StoreError,
    },
}

/// Knobs that distinguish live syncing from historical backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Compute and refresh `is_completed`; when false rows are stored complete and
    /// existing rows are never touched.
    pub track_completion: bool,
    /// Discard the newest bar of the window before planning.
    pub drop_last_bar: bool,
}

impl ReconcilePolicy {
    /// Continuous sync: track completion, keep the forming bar.
    pub const fn live() -> Self {
        Self {
            track_completion: true,
            drop_last_bar: false,
        }
    }

    /// Historical load: append-if-absent, skip the (likely forming) newest bar.
    pub const fn backfill() -> Self {
        Self {
            track_completion: false,
            drop_last_bar: true,
        }
    }
}

/// Per-reconciler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Bars requested per fetch.
    pub window_size: usize,
    /// Upper bound on activation plus fetch.
    pub fetch_timeout: Duration,
    /// Handling of repeated open times within one fetch.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            window_size: 1000,
            fetch_timeout: Duration::from_secs(15),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Bars returned by the source (before normalization).
    pub fetched: usize,
    /// Reference time used for every completion decision, if the window was non-empty.
    pub reference_time: Option<i64>,
    /// Rows inserted.
    pub inserted: usize,
    /// Rows updated in place.
    pub updated: usize,
    /// Rows already stored and complete.
    pub unchanged: usize,
    /// Rows skipped because the reference clock regressed.
    pub skew_ignored: usize,
    /// Rows the store refused; the rest of the batch was applied.
    pub failures: Vec<RowFailure>,
}

impl ReconcileReport {
    /// Writes that actually landed: the cycle's "useful work" signal.
    pub fn updated_count(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Reconciles series from a quote source into a [`CandleStore`].
pub struct Reconciler<S> {
    source: Arc<dyn QuoteSource>,
    store: S,
    clock: Arc<dyn Clock>,
    options: ReconcileOptions,
}

impl<S: CandleStore> Reconciler<S> {
    /// Wires a source, a store and a reference clock together.
    pub fn new(
        source: Arc<dyn QuoteSource>,
        store: S,
        clock: Arc<dyn Clock>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            source,
            store,
            clock,
            options,
        }
    }

    /// Current settings.
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Replaces the settings (e.g. to switch window size between live and backfill).
    pub fn set_options(&mut self, options: ReconcileOptions) {
        self.options = options;
    }

    /// The store being written.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the store (e.g. for read-side queries on the same handle).
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Runs one reconciliation of `series` under `policy`.
    #[instrument(level = "debug", skip(self, series), fields(series = %series))]
    pub async fn reconcile(
        &mut self,
        series: &SeriesKey,
        policy: ReconcilePolicy,
    ) -> Result<ReconcileReport, SyncError> {
        let raw = self.fetch(series).await?;
        let mut report = ReconcileReport {
            fetched: raw.len(),
            ..Default::default()
        };
        if raw.is_empty() {
            warn!(%series, source = self.source.name(), "source returned no bars");
            return Ok(report);
        }

        let mut window = normalize_window(raw, self.options.duplicate_policy).map_err(|source| {
            SyncError::InvalidWindow {
                series: series.clone(),
                source,
            }
        })?;
        if window.reordered || window.duplicates_dropped > 0 {
            debug!(
                %series,
                reordered = window.reordered,
                duplicates = window.duplicates_dropped,
                "normalized fetched window"
            );
        }
        if policy.drop_last_bar {
            window.bars.pop();
        }
        let Some(first) = window.bars.first().map(|b| b.open_time) else {
            return Ok(report);
        };

        let reference_time = self.clock.now_epoch_seconds();
        report.reference_time = Some(reference_time);
        let period = Some(series.granularity().period_seconds());
        let candles: Vec<Candle> = window
            .bars
            .iter()
            .map(|bar| {
                let done = !policy.track_completion
                    || is_complete(bar.open_time, period, reference_time);
                Candle::from_raw(bar, done)
            })
            .collect();

        let existing = self
            .store
            .existing(series, Some(first))
            .map_err(|source| SyncError::Store {
                series: series.clone(),
                source,
            })?;

        let plan = diff::plan(&candles, &existing, &policy);
        report.unchanged = plan.unchanged;
        report.skew_ignored = plan.skew_ignored;
        if plan.skew_ignored > 0 {
            warn!(
                %series,
                reference_time,
                rows = plan.skew_ignored,
                "reference time behind stored completion; rows left as complete"
            );
        }
        if plan.is_noop() {
            return Ok(report);
        }
        debug!(%series, "planned changes:\n{plan}");

        let batch = self
            .store
            .apply(series, &plan.mutations())
            .map_err(|source| SyncError::Store {
                series: series.clone(),
                source,
            })?;
        for failure in &batch.failures {
            error!(
                %series,
                open_time = failure.open_time,
                kind = ?failure.kind,
                error = %failure.error,
                "failed to write candle"
            );
        }

        report.inserted = batch.inserted;
        report.updated = batch.updated;
        report.failures = batch.failures;
        if report.updated_count() > 0 {
            info!(
                %series,
                inserted = report.inserted,
                updated = report.updated,
                "Updated {} candles for {}",
                report.updated_count(),
                series
            );
        }
        Ok(report)
    }

    async fn fetch(&self, series: &SeriesKey) -> Result<Vec<RawBar>, SyncError> {
        let source = &self.source;
        let instrument = series.instrument();
        let native = series.granularity().native();
        let window_size = self.options.window_size;

        let work = async move {
            source.select_instrument(instrument).await?;
            source.fetch_recent_bars(instrument, native, window_size).await
        };

        match tokio::time::timeout(self.options.fetch_timeout, work).await {
            Ok(Ok(bars)) => Ok(bars),
            Ok(Err(source)) => Err(SyncError::SourceUnavailable {
                series: series.clone(),
                source,
            }),
            Err(_) => Err(SyncError::FetchTimeout {
                series: series.clone(),
                timeout: self.options.fetch_timeout,
            }),
        }
    }
}
