//! Incremental candle synchronization.
//!
//! Keeps per-(instrument, granularity) candle series in SQLite reconciled with a live
//! quote source: new bars are appended, the forming bar is refreshed and flagged
//! incomplete until its period elapses, and no key is ever stored twice.
//!
//! Layers, leaves first: [`granularity`] and [`completion`] (pure), [`store`] (durable
//! rows), [`sync`] (one reconciliation), [`schedule`] (the polling loop and backfill).

#![deny(missing_docs)]

pub mod completion;
pub mod config;
pub mod db;
pub mod granularity;
pub mod models;
pub mod schedule;
#[allow(missing_docs)]
pub mod schema;
#[allow(missing_docs)]
pub mod series;
pub mod store;
pub mod sync;
pub mod telemetry;
