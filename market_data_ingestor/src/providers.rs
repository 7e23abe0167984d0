//! Quote-source abstraction.
//!
//! This module defines the [`QuoteSource`] trait, the single interface the sync engine
//! uses to pull recent bars for one (instrument, timeframe) pair. Concrete sources
//! handle vendor-specific transport and validation.
//!
//! The trait is async and object safe, so callers hold `Arc<dyn QuoteSource>` and pick
//! the implementation at runtime.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_data_ingestor::models::{bar::RawBar, timeframe::NativeTimeframe};
//! use market_data_ingestor::providers::{ProviderError, QuoteSource};
//!
//! struct Empty;
//!
//! #[async_trait]
//! impl QuoteSource for Empty {
//!     fn name(&self) -> &str {
//!         "empty"
//!     }
//!
//!     async fn select_instrument(&self, _instrument: &str) -> Result<(), ProviderError> {
//!         Ok(())
//!     }
//!
//!     async fn fetch_recent_bars(
//!         &self,
//!         _instrument: &str,
//!         _timeframe: NativeTimeframe,
//!         _max_count: usize,
//!     ) -> Result<Vec<RawBar>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod bridge_rest;
pub mod memory;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{bar::RawBar, timeframe::NativeTimeframe};

/// A source of recent OHLCV bars.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Makes the instrument available for quoting (e.g. adds it to the terminal's
    /// market watch). Must succeed before bars can be fetched.
    async fn select_instrument(&self, instrument: &str) -> Result<(), ProviderError>;

    /// Fetches up to `max_count` of the most recent bars, the still-forming bar included.
    ///
    /// Ordering is source-defined; consumers must normalize. An empty vector means the
    /// source had nothing for this pair.
    async fn fetch_recent_bars(
        &self,
        instrument: &str,
        timeframe: NativeTimeframe,
        max_count: usize,
    ) -> Result<Vec<RawBar>, ProviderError>;
}

/// Errors that can occur during the creation of a source instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The source configuration is unusable.
    #[snafu(display("Invalid source configuration: {message}"))]
    InvalidConfig {
        message: String,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a [`QuoteSource`] implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The source answered with a non-success status.
    #[snafu(display("API error ({status}): {message}"))]
    Api {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific source.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },

    /// The instrument could not be activated for quoting.
    #[snafu(display("Instrument {instrument} is not available for quoting"))]
    InstrumentUnavailable {
        instrument: String,
        backtrace: Backtrace,
    },

    /// An internal error occurred while processing data within the source.
    #[snafu(display("Internal provider error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}
