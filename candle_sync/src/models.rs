//! Diesel row types for [`crate::schema::candles`](crate::schema::candles).

use diesel::prelude::*;
use serde::Serialize;

use crate::series::{Candle, SeriesKey};

/// A stored candle row.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::candles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CandleRow {
    /// Instrument symbol, e.g. "EURUSD".
    pub instrument: String,
    /// Granularity label, e.g. "M1".
    pub granularity: String,
    /// Bar open time, epoch seconds UTC.
    pub open_time: i64,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Tick count.
    pub tick_volume: i64,
    /// Spread in points (0 when the source did not report it).
    pub spread: i64,
    /// Exchange volume (0 when the source did not report it).
    pub real_volume: i64,
    /// Whether the bar's period had elapsed when it was last written.
    pub is_completed: bool,
    /// Last write time, RFC 3339 UTC.
    pub updated_at: String,
}

impl CandleRow {
    /// Drops the identity columns.
    pub fn into_candle(self) -> Candle {
        Candle {
            open_time: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            tick_volume: self.tick_volume,
            spread: self.spread,
            real_volume: self.real_volume,
            is_completed: self.is_completed,
        }
    }
}

/// Insertable form of [`CandleRow`].
#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::candles)]
pub struct NewCandleRow<'a> {
    /// Instrument symbol.
    pub instrument: &'a str,
    /// Granularity label.
    pub granularity: &'a str,
    /// Bar open time.
    pub open_time: i64,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Tick count.
    pub tick_volume: i64,
    /// Spread in points.
    pub spread: i64,
    /// Exchange volume.
    pub real_volume: i64,
    /// Completion flag.
    pub is_completed: bool,
    /// Write time.
    pub updated_at: &'a str,
}

impl<'a> NewCandleRow<'a> {
    /// Borrows identity from `series` and values from `candle`.
    pub fn new(series: &'a SeriesKey, candle: &Candle, updated_at: &'a str) -> Self {
        Self {
            instrument: series.instrument(),
            granularity: series.granularity().label(),
            open_time: candle.open_time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            tick_volume: candle.tick_volume,
            spread: candle.spread,
            real_volume: candle.real_volume,
            is_completed: candle.is_completed,
            updated_at,
        }
    }
}

/// Mutable columns of a candle, used for the conflict branch of an upsert.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = crate::schema::candles)]
pub struct CandleChangeset<'a> {
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Tick count.
    pub tick_volume: i64,
    /// Spread in points.
    pub spread: i64,
    /// Exchange volume.
    pub real_volume: i64,
    /// Completion flag.
    pub is_completed: bool,
    /// Write time.
    pub updated_at: &'a str,
}

impl<'a> From<&NewCandleRow<'a>> for CandleChangeset<'a> {
    fn from(row: &NewCandleRow<'a>) -> Self {
        Self {
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            tick_volume: row.tick_volume,
            spread: row.spread,
            real_volume: row.real_volume,
            is_completed: row.is_completed,
            updated_at: row.updated_at,
        }
    }
}
