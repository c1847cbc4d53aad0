//! Type-state builder for `Tacho` and generic `build_tacho` constructor.
//!
//! The builder enforces at compile time that a motor driver is provided
//! before `build()` is available. `try_build()` is always available for
//! dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use crossbeam_channel as xch;
use tacho_traits::clock::{Clock, MonotonicClock};
use tacho_traits::{MotorDriver, Timebase};

use crate::config::*;
use crate::core::{EVENT_CAPACITY, TachoCore};
use crate::decoder::EncoderDecoder;
use crate::error::{BuildError, Result};
use crate::estimator::SpeedEstimator;
use crate::model::MotorModel;
use crate::output::OutputMapper;
use crate::pid::{PositionHold, SpeedRegulator};
use crate::ramp::RampProfile;
use crate::state::{Modes, Setpoints};
use crate::types::TachoState;

/// Controller with a boxed driver, as produced by [`TachoBuilder`].
pub type Tacho = TachoCore<Box<dyn MotorDriver + Send>>;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Tacho`. All fields are validated on `build()`.
pub struct TachoBuilder<D> {
    driver: Option<Box<dyn MotorDriver + Send>>,
    model: MotorModel,
    control: Option<ControlCfg>,
    decoder: Option<DecoderCfg>,
    ramp: Option<RampCfg>,
    hold: Option<HoldCfg>,
    gains: Option<PidGains>,
    timebase: Option<Timebase>,
    _d: PhantomData<D>,
}

impl Default for TachoBuilder<Missing> {
    fn default() -> Self {
        Self {
            driver: None,
            model: MotorModel::default(),
            control: None,
            decoder: None,
            ramp: None,
            hold: None,
            gains: None,
            timebase: None,
            _d: PhantomData,
        }
    }
}

impl Tacho {
    /// Start building a Tacho.
    pub fn builder() -> TachoBuilder<Missing> {
        TachoBuilder::default()
    }
}

/// Optional construction parameters shared by the builder and `build_tacho`.
#[derive(Debug, Clone, Default)]
pub struct TachoParts {
    pub model: MotorModel,
    pub control: ControlCfg,
    pub decoder: DecoderCfg,
    pub ramp: RampCfg,
    pub hold: HoldCfg,
    pub gains: PidGains,
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Shared validation and construction used by both `TachoBuilder::try_build()`
/// and `build_tacho()`.
fn validate_and_build<D: MotorDriver>(
    driver: D,
    parts: TachoParts,
    timebase: Option<Timebase>,
) -> Result<TachoCore<D>> {
    // ── Validation ───────────────────────────────────────────────────────────
    if !(1..=100).contains(&parts.control.tick_ms) {
        return Err(invalid("tick_ms must be in [1, 100]"));
    }
    if parts.decoder.high_speed_percent < 0 {
        return Err(invalid("high_speed_percent must be >= 0"));
    }
    if parts.ramp.nudge_ms < 1 {
        return Err(invalid("nudge_ms must be >= 1"));
    }
    if parts.ramp.forever_horizon_ms < 1 {
        return Err(invalid("forever_horizon_ms must be >= 1"));
    }
    let g = parts.gains;
    if g.kp < 0 || g.ki < 0 || g.kd < 0 || g.kf < 0 {
        return Err(invalid("speed gains must be >= 0"));
    }
    if !(0..=100).contains(&parts.hold.decay_percent) {
        return Err(invalid("hold decay_percent must be in [0, 100]"));
    }
    if parts.hold.kp < 0 || parts.hold.kd < 0 {
        return Err(invalid("hold gains must be >= 0"));
    }

    // ── Construction ─────────────────────────────────────────────────────────
    let timebase = timebase.unwrap_or_default();
    let (events_tx, events_rx) = xch::bounded(EVENT_CAPACITY);
    let mut core = TachoCore {
        output: OutputMapper::new(driver),
        decoder: Arc::new(EncoderDecoder::new(&parts.decoder)),
        estimator: SpeedEstimator::new(),
        ramp: RampProfile::default(),
        speed_pid: SpeedRegulator::new(parts.gains),
        base_gains: parts.gains,
        hold: PositionHold::new(parts.hold),
        model: parts.model,
        sp: Setpoints::default(),
        modes: Modes::default(),
        state: TachoState::Idle,
        run: false,
        estop: None,
        resting: 0,
        control: parts.control,
        ramp_cfg: parts.ramp,
        timebase,
        events_tx,
        events_rx,
        ticks: 0,
    };
    core.reset();
    tracing::debug!(model = %core.model, tick_ms = core.control.tick_ms, "tacho attached");
    Ok(core)
}

impl<D> TachoBuilder<D> {
    /// Fallible build available in any type-state; returns a typed error for
    /// missing pieces.
    pub fn try_build(self) -> Result<Tacho> {
        let driver = self
            .driver
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDriver))?;
        let parts = TachoParts {
            model: self.model,
            control: self.control.unwrap_or_default(),
            decoder: self.decoder.unwrap_or_default(),
            ramp: self.ramp.unwrap_or_default(),
            hold: self.hold.unwrap_or_default(),
            gains: self.gains.unwrap_or_default(),
        };
        validate_and_build(driver, parts, self.timebase)
    }
}

/// Chainable setters that do not affect type-state.
impl<D> TachoBuilder<D> {
    pub fn with_model(mut self, model: MotorModel) -> Self {
        self.model = model;
        self
    }
    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.control = Some(control);
        self
    }
    pub fn with_decoder(mut self, decoder: DecoderCfg) -> Self {
        self.decoder = Some(decoder);
        self
    }
    pub fn with_ramp(mut self, ramp: RampCfg) -> Self {
        self.ramp = Some(ramp);
        self
    }
    pub fn with_hold(mut self, hold: HoldCfg) -> Self {
        self.hold = Some(hold);
        self
    }
    pub fn with_gains(mut self, gains: PidGains) -> Self {
        self.gains = Some(gains);
        self
    }

    /// Inject a clock (tests use a manual one). Edge sources must stamp from
    /// the built core's `timebase()`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.timebase = Some(Timebase::new(Arc::from(clock)));
        self
    }
}

// Setters that advance type-state
impl TachoBuilder<Missing> {
    pub fn with_driver(self, driver: impl MotorDriver + Send + 'static) -> TachoBuilder<Set> {
        TachoBuilder {
            driver: Some(Box::new(driver)),
            model: self.model,
            control: self.control,
            decoder: self.decoder,
            ramp: self.ramp,
            hold: self.hold,
            gains: self.gains,
            timebase: self.timebase,
            _d: PhantomData,
        }
    }
}

impl TachoBuilder<Set> {
    /// Validate and build the Tacho. Only available once a driver is set.
    pub fn build(self) -> Result<Tacho> {
        self.try_build()
    }
}

/// Build a generic, statically-dispatched `TachoCore` from a concrete driver.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_tacho<D>(
    driver: D,
    parts: TachoParts,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<TachoCore<D>>
where
    D: MotorDriver + 'static,
{
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    validate_and_build(driver, parts, Some(Timebase::new(clock)))
}
