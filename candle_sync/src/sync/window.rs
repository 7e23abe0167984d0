//! Normalization of a fetched window.
//!
//! Sources are expected to return a clean ascending window, but nothing guarantees it.
//! Windows are stable-sorted by open time; repeated open times are handled by an
//! explicit [`DuplicatePolicy`].

use market_data_ingestor::models::bar::RawBar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to do when one fetch contains the same open time more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail the window; nothing is written for the pair this cycle.
    Reject,
    /// Keep the occurrence that came last in source order.
    #[default]
    LastWriteWins,
}

/// Window rejected by normalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// Two bars share an open time under [`DuplicatePolicy::Reject`].
    #[error("window contains open_time {open_time} more than once")]
    DuplicateOpenTime {
        /// The repeated key.
        open_time: i64,
    },
}

/// A window sorted ascending with unique open times.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWindow {
    /// Bars, strictly ascending by open time.
    pub bars: Vec<RawBar>,
    /// Whether the source order had to be changed.
    pub reordered: bool,
    /// Bars discarded as duplicates.
    pub duplicates_dropped: usize,
}

/// Sorts `bars` ascending and resolves duplicates per `policy`.
pub fn normalize_window(
    mut bars: Vec<RawBar>,
    policy: DuplicatePolicy,
) -> Result<NormalizedWindow, WindowError> {
    let reordered = bars.windows(2).any(|w| w[0].open_time > w[1].open_time);
    if reordered {
        // stable: equal keys keep source order
        bars.sort_by_key(|b| b.open_time);
    }

    let mut out: Vec<RawBar> = Vec::with_capacity(bars.len());
    let mut duplicates_dropped = 0;
    for bar in bars {
        match out.last_mut() {
            Some(prev) if prev.open_time == bar.open_time => match policy {
                DuplicatePolicy::Reject => {
                    return Err(WindowError::DuplicateOpenTime {
                        open_time: bar.open_time,
                    });
                }
                DuplicatePolicy::LastWriteWins => {
                    *prev = bar;
                    duplicates_dropped += 1;
                }
            },
            _ => out.push(bar),
        }
    }

    Ok(NormalizedWindow {
        bars: out,
        reordered,
        duplicates_dropped,
    })
}
