//! Series identity and the candle row model used by the sync engine.

use std::fmt;

use market_data_ingestor::models::bar::RawBar;
use serde::Serialize;

use crate::granularity::{Granularity, GranularityError, lookup};

/// Structured identity of one stored series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    instrument: String,
    granularity: Granularity,
}

impl SeriesKey {
    pub fn new(instrument: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            instrument: instrument.into(),
            granularity,
        }
    }

    /// Builds a key from a granularity label.
    pub fn parse(instrument: impl Into<String>, label: &str) -> Result<Self, GranularityError> {
        Ok(Self::new(instrument, lookup(label)?))
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instrument, self.granularity)
    }
}

/// A bar together with its completion flag, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: i64,
    pub spread: i64,
    pub real_volume: i64,
    pub is_completed: bool,
}

impl Candle {
    /// Adopts a raw bar; missing spread and real volume become 0.
    pub fn from_raw(raw: &RawBar, is_completed: bool) -> Self {
        Self {
            open_time: raw.open_time,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            tick_volume: raw.tick_volume,
            spread: raw.spread.unwrap_or(0),
            real_volume: raw.real_volume.unwrap_or(0),
            is_completed,
        }
    }
}
