//! SQLite-backed [`CandleStore`].
//!
//! ## Transactions
//! [`CandleStore::apply`] runs the whole batch inside one **`BEGIN IMMEDIATE`**
//! transaction, so the bulk read that planned it and the writes are not interleaved
//! with another writer's batch for long, and each row runs in its own savepoint: a row
//! that violates a constraint rolls back alone and is reported in the [`BatchResult`].

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;

use crate::{
    db::{connection::connect_sqlite, migrate::run_pending},
    models::{CandleChangeset, CandleRow, NewCandleRow},
    schema::candles,
    series::{Candle, SeriesKey},
    store::{BatchResult, CandleStore, Mutation, StoreError, StoreResult},
};

/// Candle store over a single SQLite connection.
pub struct SqliteStore {
    conn: SqliteConnection,
}

impl SqliteStore {
    /// Opens (and migrates) the database at `database_url`.
    pub fn open(database_url: &str) -> StoreResult<Self> {
        let mut conn = connect_sqlite(database_url).map_err(StoreError::Connection)?;
        run_pending(&mut conn).map_err(StoreError::Connection)?;
        Ok(Self { conn })
    }

    /// Wraps an already prepared connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    /// Underlying connection, for read-side queries.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

fn write_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// INSERT .. ON CONFLICT (instrument, granularity, open_time) DO UPDATE.
pub fn upsert_candle(
    conn: &mut SqliteConnection,
    series: &SeriesKey,
    candle: &Candle,
    updated_at: &str,
) -> QueryResult<()> {
    use candles::dsl as c;

    let row = NewCandleRow::new(series, candle, updated_at);
    diesel::insert_into(c::candles)
        .values(&row)
        .on_conflict((c::instrument, c::granularity, c::open_time))
        .do_update()
        .set(&CandleChangeset::from(&row))
        .execute(conn)?;
    Ok(())
}

impl CandleStore for SqliteStore {
    fn existing(
        &mut self,
        series: &SeriesKey,
        since: Option<i64>,
    ) -> StoreResult<BTreeMap<i64, Candle>> {
        use candles::dsl as c;

        let mut query = c::candles
            .filter(c::instrument.eq(series.instrument()))
            .filter(c::granularity.eq(series.granularity().label()))
            .select(CandleRow::as_select())
            .into_boxed();
        if let Some(since) = since {
            query = query.filter(c::open_time.ge(since));
        }

        let rows: Vec<CandleRow> = query.load(&mut self.conn)?;
        Ok(rows
            .into_iter()
            .map(|r| (r.open_time, r.into_candle()))
            .collect())
    }

    fn existing_keys(
        &mut self,
        series: &SeriesKey,
        since: Option<i64>,
    ) -> StoreResult<BTreeMap<i64, bool>> {
        use candles::dsl as c;

        let mut query = c::candles
            .filter(c::instrument.eq(series.instrument()))
            .filter(c::granularity.eq(series.granularity().label()))
            .select((c::open_time, c::is_completed))
            .into_boxed();
        if let Some(since) = since {
            query = query.filter(c::open_time.ge(since));
        }

        let rows: Vec<(i64, bool)> = query.load(&mut self.conn)?;
        Ok(rows.into_iter().collect())
    }

    fn upsert(&mut self, series: &SeriesKey, candle: &Candle) -> StoreResult<()> {
        upsert_candle(&mut self.conn, series, candle, &write_stamp())?;
        Ok(())
    }

    fn apply(&mut self, series: &SeriesKey, mutations: &[Mutation]) -> StoreResult<BatchResult> {
        let stamp = write_stamp();
        self.conn.immediate_transaction::<_, StoreError, _>(|conn| {
            let mut result = BatchResult::default();
            for m in mutations {
                let outcome = conn
                    .transaction::<_, diesel::result::Error, _>(|sp| {
                        upsert_candle(sp, series, &m.candle, &stamp)
                    })
                    .map_err(StoreError::from);
                result.record(m, outcome);
            }
            Ok(result)
        })
    }
}
