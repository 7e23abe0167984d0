//! Granularity catalog.
//!
//! Maps a period label (`"M1"`, `"H4"`, `"MN1"`, ...) to its length in seconds and to the
//! quote source's native period token. The table is fixed; lookups are exact on the
//! canonical upper-case label and unknown labels are reported, never defaulted.
//!
//! `MN1` is treated as a flat 30 days. Monthly bars therefore flip to complete a little
//! early or late relative to calendar months; nothing downstream depends on it.

use std::fmt;

use indexmap::IndexMap;
use market_data_ingestor::models::timeframe::NativeTimeframe;
use once_cell::sync::Lazy;
use thiserror::Error;

/// Catalog lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GranularityError {
    /// The label is not in the catalog.
    #[error("unknown granularity {label:?}")]
    Unknown {
        /// Label as given by the caller.
        label: String,
    },
}

/// One immutable catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Granularity {
    label: &'static str,
    period_seconds: i64,
    native: NativeTimeframe,
}

impl Granularity {
    /// Canonical label, e.g. `"H1"`.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Period length in seconds.
    pub fn period_seconds(&self) -> i64 {
        self.period_seconds
    }

    /// Token the quote source expects for this period.
    pub fn native(&self) -> NativeTimeframe {
        self.native
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

const TABLE: &[(&str, i64, NativeTimeframe)] = &[
    ("M1", MINUTE, NativeTimeframe::M1),
    ("M2", 2 * MINUTE, NativeTimeframe::M2),
    ("M3", 3 * MINUTE, NativeTimeframe::M3),
    ("M4", 4 * MINUTE, NativeTimeframe::M4),
    ("M5", 5 * MINUTE, NativeTimeframe::M5),
    ("M6", 6 * MINUTE, NativeTimeframe::M6),
    ("M10", 10 * MINUTE, NativeTimeframe::M10),
    ("M12", 12 * MINUTE, NativeTimeframe::M12),
    ("M15", 15 * MINUTE, NativeTimeframe::M15),
    ("M20", 20 * MINUTE, NativeTimeframe::M20),
    ("M30", 30 * MINUTE, NativeTimeframe::M30),
    ("H1", HOUR, NativeTimeframe::H1),
    ("H2", 2 * HOUR, NativeTimeframe::H2),
    ("H3", 3 * HOUR, NativeTimeframe::H3),
    ("H4", 4 * HOUR, NativeTimeframe::H4),
    ("H6", 6 * HOUR, NativeTimeframe::H6),
    ("H8", 8 * HOUR, NativeTimeframe::H8),
    ("H12", 12 * HOUR, NativeTimeframe::H12),
    ("D1", DAY, NativeTimeframe::D1),
    ("W1", 7 * DAY, NativeTimeframe::W1),
    ("MN1", 30 * DAY, NativeTimeframe::MN1),
];

static CATALOG: Lazy<IndexMap<&'static str, Granularity>> = Lazy::new(|| {
    TABLE
        .iter()
        .map(|&(label, period_seconds, native)| {
            (
                label,
                Granularity {
                    label,
                    period_seconds,
                    native,
                },
            )
        })
        .collect()
});

/// Resolves a label to its catalog entry.
pub fn lookup(label: &str) -> Result<Granularity, GranularityError> {
    CATALOG
        .get(label)
        .copied()
        .ok_or_else(|| GranularityError::Unknown {
            label: label.to_string(),
        })
}

/// Period length of `label` in seconds.
pub fn seconds_for(label: &str) -> Result<i64, GranularityError> {
    lookup(label).map(|g| g.period_seconds)
}

/// Native source token for `label`.
pub fn native_identifier_for(label: &str) -> Result<NativeTimeframe, GranularityError> {
    lookup(label).map(|g| g.native)
}

/// Every catalog entry, finest first.
pub fn all() -> impl Iterator<Item = Granularity> {
    CATALOG.values().copied()
}
