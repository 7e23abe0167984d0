//! Quote-source side of the candle pipeline.
//!
//! - [`models`]: vendor-neutral raw bars and the terminal's native timeframe tokens.
//! - [`providers`]: the [`providers::QuoteSource`] trait plus concrete sources
//!   (a REST terminal bridge and a scripted in-memory source).

pub mod models;
pub mod providers;
