//! `From` implementations bridging `tacho_config` types to `tacho_core` types.
//!
//! Values are assumed to have passed `tacho_config::Config::validate`; any
//! that would not fit the runtime type saturate instead of wrapping.

use crate::builder::TachoParts;
use crate::config::{ControlCfg, DecoderCfg, HoldCfg, PidGains, RampCfg};
use crate::model::MotorModel;

// ── ControlCfg ───────────────────────────────────────────────────────────────

impl From<&tacho_config::ControlCfg> for ControlCfg {
    fn from(c: &tacho_config::ControlCfg) -> Self {
        Self {
            tick_ms: i32::try_from(c.tick_ms).unwrap_or(i32::MAX),
        }
    }
}

// ── DecoderCfg ───────────────────────────────────────────────────────────────

impl From<&tacho_config::DecoderCfg> for DecoderCfg {
    fn from(c: &tacho_config::DecoderCfg) -> Self {
        Self {
            min_pulse_interval_us: c.min_pulse_interval_us,
            high_speed_percent: i32::try_from(c.high_speed_percent).unwrap_or(i32::MAX),
        }
    }
}

// ── RampCfg ──────────────────────────────────────────────────────────────────

impl From<&tacho_config::RampCfg> for RampCfg {
    fn from(c: &tacho_config::RampCfg) -> Self {
        Self {
            nudge_ms: c.nudge_ms,
            forever_horizon_ms: c.forever_horizon_ms,
        }
    }
}

// ── PID ──────────────────────────────────────────────────────────────────────

impl From<&tacho_config::SpeedPidCfg> for PidGains {
    fn from(c: &tacho_config::SpeedPidCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
            kf: c.kf,
        }
    }
}

impl From<&tacho_config::HoldCfg> for HoldCfg {
    fn from(c: &tacho_config::HoldCfg) -> Self {
        Self {
            kp: c.kp,
            decay_percent: c.decay_percent,
            kd: c.kd,
        }
    }
}

// ── Whole config ─────────────────────────────────────────────────────────────

impl From<&tacho_config::Config> for TachoParts {
    fn from(c: &tacho_config::Config) -> Self {
        Self {
            model: MotorModel::from_type_id(&c.motor.model),
            control: (&c.control).into(),
            decoder: (&c.decoder).into(),
            ramp: (&c.ramp).into(),
            hold: (&c.hold).into(),
            gains: (&c.speed_pid).into(),
        }
    }
}
