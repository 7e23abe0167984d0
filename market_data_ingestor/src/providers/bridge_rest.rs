//! REST bridge to a desktop trading terminal.
//!
//! The terminal itself only offers an in-process API, so a small bridge service runs
//! next to it and exposes three endpoints:
//!
//! - `POST /api/v1/session` logs the terminal into the trading account,
//! - `POST /api/v1/symbols/{symbol}/select` adds a symbol to the market watch,
//! - `GET /api/v1/rates` copies the most recent bars (`start_pos = 0` is the forming bar).

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{BridgeConfig, BridgeRestProvider, PASSWORD_ENV};
