#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::new_without_default
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Closed-loop tacho motor control (hardware-agnostic).
//!
//! This crate provides the hardware-independent control pipeline. All
//! hardware interactions go through `tacho_traits::MotorDriver` (output) and
//! `tacho_traits::EdgeSink` (encoder input).
//!
//! ## Architecture
//!
//! - **Decoding**: edge handler, direction truth table, bounce rejection (`decoder`)
//! - **Estimation**: band-windowed speed from the timestamp ring (`estimator`)
//! - **Ramping**: trapezoidal profile and its state machine (`ramp`, `fsm`)
//! - **Regulation**: speed PID with anti-windup, position hold (`pid`)
//! - **Output**: power → direction/command/duty (`output`)
//! - **Control**: the owning state object and its accessors (`TachoCore`)
//!
//! ## Timing
//!
//! Edge timestamps are microseconds on a shared [`tacho_traits::Timebase`].
//! Ramp time is counted in milliseconds and advances by exactly one tick
//! period per tick.

pub mod builder;
pub mod config;
pub mod conversions;
pub mod core;
pub mod decoder;
pub mod error;
pub mod estimator;
mod fsm;
pub mod hw_error;
pub mod mocks;
pub mod model;
pub mod output;
pub mod pid;
pub mod ramp;
pub mod ring;
pub mod state;
pub mod status;
pub mod ticker;
pub mod types;
pub mod util;

pub use crate::builder::{Missing, Set, Tacho, TachoBuilder, TachoParts, build_tacho};
pub use crate::config::{ControlCfg, DecoderCfg, HoldCfg, PidGains, RampCfg};
pub use crate::core::TachoCore;
pub use crate::decoder::EncoderDecoder;
pub use crate::error::{BuildError, Report, Result, TachoError};
pub use crate::model::MotorModel;
pub use crate::status::{MotorEvent, TickReport};
pub use crate::ticker::Ticker;
pub use crate::types::{
    Command, Direction, Polarity, PositionMode, RegulationMode, RunMode, StopMode, TachoState,
};
