//! Native period tokens understood by the trading terminal.
//!
//! The terminal encodes minute periods as their minute count, hour periods as
//! `0x4000 | hours`, daily as `0x4000 | 24`, weekly as `0x8000 | 1` and monthly as
//! `0x4000 | 0x8000 | 1`. Callers treat the value as opaque and only pass it back.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque native timeframe token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeTimeframe(u32);

impl NativeTimeframe {
    pub const M1: Self = Self(1);
    pub const M2: Self = Self(2);
    pub const M3: Self = Self(3);
    pub const M4: Self = Self(4);
    pub const M5: Self = Self(5);
    pub const M6: Self = Self(6);
    pub const M10: Self = Self(10);
    pub const M12: Self = Self(12);
    pub const M15: Self = Self(15);
    pub const M20: Self = Self(20);
    pub const M30: Self = Self(30);
    pub const H1: Self = Self(0x4000 | 1);
    pub const H2: Self = Self(0x4000 | 2);
    pub const H3: Self = Self(0x4000 | 3);
    pub const H4: Self = Self(0x4000 | 4);
    pub const H6: Self = Self(0x4000 | 6);
    pub const H8: Self = Self(0x4000 | 8);
    pub const H12: Self = Self(0x4000 | 12);
    pub const D1: Self = Self(0x4000 | 24);
    pub const W1: Self = Self(0x8000 | 1);
    pub const MN1: Self = Self(0x4000 | 0x8000 | 1);

    /// Raw integer code, as sent to the terminal.
    pub fn code(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NativeTimeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_terminal_constants() {
        assert_eq!(NativeTimeframe::M30.code(), 30);
        assert_eq!(NativeTimeframe::H1.code(), 16385);
        assert_eq!(NativeTimeframe::H12.code(), 16396);
        assert_eq!(NativeTimeframe::D1.code(), 16408);
        assert_eq!(NativeTimeframe::W1.code(), 32769);
        assert_eq!(NativeTimeframe::MN1.code(), 49153);
    }
}
