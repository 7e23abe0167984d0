//! Raw bar as delivered by a quote source.
//!
//! This struct is the standard output of every [`QuoteSource`](crate::providers::QuoteSource)
//! implementation. It carries no completion state: deciding whether a bar's period has
//! elapsed is the consumer's job.

use serde::{Deserialize, Serialize};

/// A single OHLCV observation keyed by its open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    /// Bar open time, epoch seconds UTC.
    pub open_time: i64,

    /// Opening price.
    pub open: f64,

    /// Highest price during the bar interval.
    pub high: f64,

    /// Lowest price during the bar interval.
    pub low: f64,

    /// Closing (or latest, for a forming bar) price.
    pub close: f64,

    /// Number of ticks in the interval.
    pub tick_volume: i64,

    /// Spread in points. Not every source reports it.
    #[serde(default)]
    pub spread: Option<i64>,

    /// Exchange volume. Usually absent for OTC instruments.
    #[serde(default)]
    pub real_volume: Option<i64>,
}

impl RawBar {
    /// Convenience constructor for a bar with only a close price (flat OHLC).
    pub fn flat(open_time: i64, close: f64) -> Self {
        Self {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            tick_volume: 0,
            spread: None,
            real_volume: None,
        }
    }
}
