//! Runtime configuration types for the control core.
//!
//! These are the structs `TachoCore` consumes. They are separate from the
//! TOML-deserialized config in `tacho_config`; see `conversions`.

/// Edge decoder tuning.
#[derive(Debug, Clone)]
pub struct DecoderCfg {
    /// Edges closer than this are treated as contact bounce (µs).
    pub min_pulse_interval_us: u64,
    /// Above this measured speed (percent of model max rate) the decoder
    /// keeps the last direction instead of reading the pins.
    pub high_speed_percent: i32,
}

impl Default for DecoderCfg {
    fn default() -> Self {
        Self {
            min_pulse_interval_us: 400,
            high_speed_percent: 35,
        }
    }
}

/// Fixed tick settings.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Tick period; ramp time advances by exactly this much per tick.
    pub tick_ms: i32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self { tick_ms: 2 }
    }
}

/// Ramp engine constants.
#[derive(Debug, Clone)]
pub struct RampCfg {
    /// Extension applied when a position move's down window runs out
    /// before the target is reached (ms).
    pub nudge_ms: i32,
    /// Down-window end for run-forever (ms).
    pub forever_horizon_ms: i32,
}

impl Default for RampCfg {
    fn default() -> Self {
        Self {
            nudge_ms: 100,
            forever_horizon_ms: 3_600_000,
        }
    }
}

/// Speed regulator gains. Power = (P·kp + I·ki + D·kd) / kf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidGains {
    pub kp: i32,
    pub ki: i32,
    pub kd: i32,
    pub kf: i32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1000,
            ki: 60,
            kd: 0,
            kf: 9000,
        }
    }
}

/// Position-hold regulator constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldCfg {
    pub kp: i32,
    /// Integral retained per tick, percent.
    pub decay_percent: i32,
    pub kd: i32,
}

impl Default for HoldCfg {
    fn default() -> Self {
        Self {
            kp: 400,
            decay_percent: 99,
            kd: 4,
        }
    }
}
