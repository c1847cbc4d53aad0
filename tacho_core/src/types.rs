//! Mode selectors and the ramp state machine's states.

use std::fmt;

pub use tacho_traits::{Command, Polarity};

/// What ends a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunMode {
    /// Until the run flag is cleared.
    #[default]
    Forever,
    /// For `time_sp` milliseconds.
    Time,
    /// Until `position_sp` is reached.
    Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegulationMode {
    /// Open loop: the ramp drives duty cycle directly.
    #[default]
    Off,
    /// Closed loop: the ramp drives the speed regulator's target.
    On,
}

impl RegulationMode {
    #[inline]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Output behaviour once a move has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StopMode {
    #[default]
    Coast,
    Brake,
    /// Actively hold the stop position.
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PositionMode {
    #[default]
    Absolute,
    /// `position_sp` is added to the previous target.
    Relative,
}

/// Last decoded direction of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Direction {
    #[default]
    Unknown = 0,
    Forward = 1,
    Reverse = 2,
}

impl Direction {
    #[inline]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Forward,
            2 => Self::Reverse,
            _ => Self::Unknown,
        }
    }

    /// Position increment for an edge decoded in this direction.
    #[inline]
    pub const fn step(self) -> i32 {
        match self {
            Self::Forward => 1,
            _ => -1,
        }
    }
}

/// Ramp state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TachoState {
    RunForever,
    SetupRampTime,
    SetupRampPosition,
    SetupRampRegulation,
    RampUp,
    RampConst,
    PositionRampDown,
    RampDown,
    Stop,
    #[default]
    Idle,
}

impl TachoState {
    /// States during which ramp time advances.
    #[inline]
    pub const fn is_ramping(self) -> bool {
        matches!(
            self,
            Self::RampUp | Self::RampConst | Self::PositionRampDown | Self::RampDown
        )
    }

    /// States that complete within the tick they are first processed in.
    #[inline]
    pub const fn is_setup(self) -> bool {
        matches!(
            self,
            Self::RunForever
                | Self::SetupRampTime
                | Self::SetupRampPosition
                | Self::SetupRampRegulation
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunForever => "run_forever",
            Self::SetupRampTime => "setup_ramp_time",
            Self::SetupRampPosition => "setup_ramp_position",
            Self::SetupRampRegulation => "setup_ramp_regulation",
            Self::RampUp => "ramp_up",
            Self::RampConst => "ramp_const",
            Self::PositionRampDown => "position_ramp_down",
            Self::RampDown => "ramp_down",
            Self::Stop => "stop",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for TachoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
