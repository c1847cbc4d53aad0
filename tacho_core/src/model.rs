//! Per-model motor constants.

use std::fmt;
use std::str::FromStr;

/// Supported tacho motor models, each carrying its own constant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MotorModel {
    #[default]
    Large,
    Medium,
}

impl MotorModel {
    /// Longest plausible interval between two pulses (µs). Slower than this
    /// counts as stalled.
    #[inline]
    pub const fn counts_per_pulse(self) -> u64 {
        match self {
            Self::Large => 100_000,
            Self::Medium => 62_500,
        }
    }

    #[inline]
    pub const fn max_pulses_per_second(self) -> i32 {
        match self {
            Self::Large => 900,
            Self::Medium => 1200,
        }
    }

    /// Averaging windows indexed by speed band, slowest first.
    #[inline]
    pub const fn sample_windows(self) -> [usize; 4] {
        match self {
            Self::Large => [4, 16, 32, 64],
            Self::Medium => [2, 4, 8, 16],
        }
    }

    /// Pick the averaging window for an instantaneous band value.
    pub const fn window_for_band(self, band: u64) -> usize {
        let w = self.sample_windows();
        if band > 80 {
            w[3]
        } else if band > 60 {
            w[2]
        } else if band > 40 {
            w[1]
        } else {
            w[0]
        }
    }

    /// Static lookup by type id. Unknown ids fall back to `Large`.
    pub fn from_type_id(id: &str) -> Self {
        id.parse().unwrap_or_else(|_| {
            tracing::warn!(id, "unknown motor type id; assuming large motor");
            Self::Large
        })
    }

    pub const fn type_id(self) -> &'static str {
        match self {
            Self::Large => "lego-ev3-l",
            Self::Medium => "lego-ev3-m",
        }
    }
}

impl FromStr for MotorModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lego-ev3-l" | "large" => Ok(Self::Large),
            "lego-ev3-m" | "medium" => Ok(Self::Medium),
            other => Err(format!("unknown motor model '{other}'")),
        }
    }
}

impl fmt::Display for MotorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_id())
    }
}
