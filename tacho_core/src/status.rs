//! Per-tick report and asynchronous motor events.

use crate::types::TachoState;

/// Snapshot returned from every control tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub state: TachoState,
    pub running: bool,
    /// Resting plus live position, in pulses.
    pub position: i32,
    /// Measured speed, pulses per second.
    pub speed: i32,
    /// Power currently applied, percent.
    pub power: i32,
    /// Ramp progress of the active phase.
    pub percent: i32,
    /// Whether the estimator produced a new value this tick.
    pub speed_updated: bool,
}

/// Notifications published on the core's event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorEvent {
    /// The state machine settled in `state` (currently always Idle).
    StateChanged { state: TachoState, position: i32 },
    EstopArmed,
    EstopReleased,
}
