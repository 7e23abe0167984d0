//! Scripted in-memory quote source.
//!
//! Holds a bar window per (instrument, timeframe) that callers replace between cycles,
//! plus knobs for injecting failures: failing the next N fetches, refusing instrument
//! activation, and delaying responses. Used by the sync engine's tests and for dry runs
//! against recorded windows.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    models::{bar::RawBar, timeframe::NativeTimeframe},
    providers::{InstrumentUnavailableSnafu, InternalSnafu, ProviderError, QuoteSource},
};

type PairKey = (String, NativeTimeframe);

#[derive(Default)]
struct State {
    bars: HashMap<PairKey, Vec<RawBar>>,
    failures: HashMap<PairKey, u32>,
    unavailable: HashSet<String>,
    delay: Option<Duration>,
    fetch_calls: usize,
}

/// [`QuoteSource`] serving whatever windows were last scripted into it.
#[derive(Default)]
pub struct MemorySource {
    state: Mutex<State>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the window served for a pair. Order is kept as given.
    pub fn set_bars(&self, instrument: &str, timeframe: NativeTimeframe, bars: Vec<RawBar>) {
        self.state()
            .bars
            .insert((instrument.to_string(), timeframe), bars);
    }

    /// Makes the next `times` fetches for a pair fail with an internal error.
    pub fn fail_next(&self, instrument: &str, timeframe: NativeTimeframe, times: u32) {
        self.state()
            .failures
            .insert((instrument.to_string(), timeframe), times);
    }

    /// Refuses activation of `instrument` from now on.
    pub fn mark_unavailable(&self, instrument: &str) {
        self.state().unavailable.insert(instrument.to_string());
    }

    /// Delays every fetch by `delay` (tokio time, so paused clocks apply).
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// Number of fetch attempts seen so far, failed ones included.
    pub fn fetch_calls(&self) -> usize {
        self.state().fetch_calls
    }
}

#[async_trait]
impl QuoteSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn select_instrument(&self, instrument: &str) -> Result<(), ProviderError> {
        if self.state().unavailable.contains(instrument) {
            return InstrumentUnavailableSnafu { instrument }.fail();
        }
        Ok(())
    }

    async fn fetch_recent_bars(
        &self,
        instrument: &str,
        timeframe: NativeTimeframe,
        max_count: usize,
    ) -> Result<Vec<RawBar>, ProviderError> {
        let delay = {
            let mut state = self.state();
            state.fetch_calls += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        let key = (instrument.to_string(), timeframe);
        if let Some(left) = state.failures.get_mut(&key) {
            if *left > 0 {
                *left -= 1;
                return InternalSnafu {
                    message: format!("scripted failure for {instrument}/{timeframe}"),
                }
                .fail();
            }
        }

        let bars = state.bars.get(&key).cloned().unwrap_or_default();
        let start = bars.len().saturating_sub(max_count);
        Ok(bars[start..].to_vec())
    }
}
