use serde::Serialize;

use crate::{
    models::timeframe::NativeTimeframe,
    providers::{ProviderError, ValidationSnafu},
};

/// Largest window the terminal hands out in a single copy.
pub const MAX_RATES_COUNT: usize = 99_999;

/// Query string for `GET /api/v1/rates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatesQuery<'a> {
    pub symbol: &'a str,
    pub timeframe: u32,
    pub start_pos: u32,
    pub count: usize,
}

/// Body for `POST /api/v1/session`.
#[derive(Debug, Serialize)]
pub struct SessionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<&'a str>,
}

/// Builds the rates query, rejecting empty symbols and zero counts.
///
/// Counts above [`MAX_RATES_COUNT`] are clamped rather than rejected.
pub fn construct_rates_query<'a>(
    symbol: &'a str,
    timeframe: NativeTimeframe,
    count: usize,
) -> Result<RatesQuery<'a>, ProviderError> {
    if symbol.trim().is_empty() {
        return ValidationSnafu {
            message: "symbol must not be empty",
        }
        .fail();
    }
    if count == 0 {
        return ValidationSnafu {
            message: "count must be at least 1",
        }
        .fail();
    }
    Ok(RatesQuery {
        symbol,
        timeframe: timeframe.code(),
        start_pos: 0,
        count: count.min(MAX_RATES_COUNT),
    })
}
