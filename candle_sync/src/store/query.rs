//! Read-side queries over stored candles.
//!
//! Pure projections: nothing here touches the reconciler, and nothing here writes.
//! Every function takes a plain connection so the read path can use its own handle
//! (WAL lets it run next to the writer).

use diesel::dsl::{count_star, max, min};
use diesel::prelude::*;
use indexmap::IndexMap;
use serde::Serialize;

use crate::{granularity::seconds_for, models::CandleRow, schema::candles, series::SeriesKey};

/// Rows returned when a query names no limit.
pub const DEFAULT_LIMIT: i64 = 100;
/// Hard ceiling on rows returned by a single query.
pub const MAX_LIMIT: i64 = 100_000;

/// Row counts and time span of one stored series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesSummary {
    /// Instrument symbol.
    pub instrument: String,
    /// Granularity label.
    pub granularity: String,
    /// Stored rows.
    pub candles: i64,
    /// Earliest open time.
    pub oldest: Option<i64>,
    /// Latest open time.
    pub newest: Option<i64>,
}

/// Whole-database overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    /// Number of distinct series.
    pub series: usize,
    /// Rows across all series.
    pub total_candles: i64,
    /// Instrument -> granularity labels, finest first.
    pub instruments: IndexMap<String, Vec<String>>,
    /// Earliest open time across all series.
    pub oldest: Option<i64>,
    /// Latest open time across all series.
    pub newest: Option<i64>,
}

/// Filter for [`load_candles`]. Bounds are inclusive epoch seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandleQuery {
    /// Lower bound on open time.
    pub start: Option<i64>,
    /// Upper bound on open time.
    pub end: Option<i64>,
    /// Maximum rows; see [`CandleQuery::effective_limit`].
    pub limit: Option<i64>,
    /// Skip the still-forming bar(s).
    pub completed_only: bool,
}

impl CandleQuery {
    /// Limit after applying the default and clamping to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Summaries for every stored series, by instrument then finest granularity first.
pub fn list_series(conn: &mut SqliteConnection) -> QueryResult<Vec<SeriesSummary>> {
    use candles::dsl as c;

    let rows: Vec<(String, String, i64, Option<i64>, Option<i64>)> = c::candles
        .group_by((c::instrument, c::granularity))
        .select((
            c::instrument,
            c::granularity,
            count_star(),
            min(c::open_time),
            max(c::open_time),
        ))
        .load(conn)?;

    let mut out: Vec<SeriesSummary> = rows
        .into_iter()
        .map(|(instrument, granularity, n, oldest, newest)| SeriesSummary {
            instrument,
            granularity,
            candles: n,
            oldest,
            newest,
        })
        .collect();
    out.sort_by(|a, b| {
        a.instrument.cmp(&b.instrument).then_with(|| {
            let ka = seconds_for(&a.granularity).unwrap_or(i64::MAX);
            let kb = seconds_for(&b.granularity).unwrap_or(i64::MAX);
            ka.cmp(&kb).then_with(|| a.granularity.cmp(&b.granularity))
        })
    });
    Ok(out)
}

/// Aggregates [`list_series`] into one overview.
pub fn database_info(conn: &mut SqliteConnection) -> QueryResult<DatabaseInfo> {
    let series = list_series(conn)?;

    let mut instruments: IndexMap<String, Vec<String>> = IndexMap::new();
    for s in &series {
        instruments
            .entry(s.instrument.clone())
            .or_default()
            .push(s.granularity.clone());
    }

    Ok(DatabaseInfo {
        series: series.len(),
        total_candles: series.iter().map(|s| s.candles).sum(),
        instruments,
        oldest: series.iter().filter_map(|s| s.oldest).min(),
        newest: series.iter().filter_map(|s| s.newest).max(),
    })
}

/// The most recent rows matching `query`, returned oldest first.
pub fn load_candles(
    conn: &mut SqliteConnection,
    series: &SeriesKey,
    query: &CandleQuery,
) -> QueryResult<Vec<CandleRow>> {
    use candles::dsl as c;

    let mut q = c::candles
        .filter(c::instrument.eq(series.instrument()))
        .filter(c::granularity.eq(series.granularity().label()))
        .select(CandleRow::as_select())
        .into_boxed();
    if let Some(start) = query.start {
        q = q.filter(c::open_time.ge(start));
    }
    if let Some(end) = query.end {
        q = q.filter(c::open_time.le(end));
    }
    if query.completed_only {
        q = q.filter(c::is_completed.eq(true));
    }

    let mut rows = q
        .order(c::open_time.desc())
        .limit(query.effective_limit())
        .load(conn)?;
    rows.reverse();
    Ok(rows)
}

/// Newest `count` rows of a series, oldest first.
pub fn latest(
    conn: &mut SqliteConnection,
    series: &SeriesKey,
    count: i64,
    completed_only: bool,
) -> QueryResult<Vec<CandleRow>> {
    load_candles(
        conn,
        series,
        &CandleQuery {
            limit: Some(count),
            completed_only,
            ..Default::default()
        },
    )
}

/// Column-oriented projection for charting: times in milliseconds, chronological.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OhlcColumns {
    /// Open times, epoch milliseconds.
    pub t: Vec<i64>,
    /// Opens.
    pub o: Vec<f64>,
    /// Highs.
    pub h: Vec<f64>,
    /// Lows.
    pub l: Vec<f64>,
    /// Closes.
    pub c: Vec<f64>,
    /// Tick volumes.
    pub v: Vec<i64>,
}

impl OhlcColumns {
    /// Builds columns from rows in the order given.
    pub fn from_rows(rows: &[CandleRow]) -> Self {
        let mut out = Self::default();
        for r in rows {
            out.t.push(r.open_time * 1000);
            out.o.push(r.open);
            out.h.push(r.high);
            out.l.push(r.low);
            out.c.push(r.close);
            out.v.push(r.tick_volume);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(CandleQuery::default().effective_limit(), DEFAULT_LIMIT);
        assert_eq!(
            CandleQuery {
                limit: Some(0),
                ..Default::default()
            }
            .effective_limit(),
            1
        );
        assert_eq!(
            CandleQuery {
                limit: Some(1_000_000),
                ..Default::default()
            }
            .effective_limit(),
            MAX_LIMIT
        );
    }
}
