//! User-facing setpoints and mode selectors.

use crate::types::{Polarity, PositionMode, RegulationMode, RunMode, StopMode};

/// Targets written by the owner between moves. Values are stored already
/// clamped to their valid ranges.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Setpoints {
    /// Open-loop power, -100..=100.
    pub duty_cycle: i32,
    /// Regulated speed, pulses per second.
    pub speed: i32,
    /// Run duration for timed moves (ms).
    pub time: i32,
    /// Position target (absolute, or an offset in relative mode).
    pub position: i32,
    /// Full-scale ramp-up time (ms).
    pub ramp_up: i32,
    /// Full-scale ramp-down time (ms).
    pub ramp_down: i32,
}

impl Setpoints {
    /// Setpoint the ramp percentage scales, depending on regulation.
    #[inline]
    pub fn active(&self, regulation: RegulationMode) -> i32 {
        if regulation.is_on() {
            self.speed
        } else {
            self.duty_cycle
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Modes {
    pub run: RunMode,
    pub regulation: RegulationMode,
    pub stop: StopMode,
    pub position: PositionMode,
    /// Output polarity.
    pub polarity: Polarity,
    /// Encoder polarity.
    pub encoder: Polarity,
}
