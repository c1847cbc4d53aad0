//! The closed-loop motor controller (`TachoCore`).
//!
//! Owns every piece of per-motor state except the edge-side atomics, which
//! live in the shared [`EncoderDecoder`]. One call to [`TachoCore::tick_at`]
//! runs the estimator, the ramp state machine and the regulators, then
//! drives the output stage.

use std::num::NonZeroU32;
use std::sync::Arc;

use crossbeam_channel as xch;
use tacho_traits::{Command, MotorDriver, Timebase};

use crate::config::{ControlCfg, PidGains, RampCfg};
use crate::decoder::EncoderDecoder;
use crate::estimator::SpeedEstimator;
use crate::model::MotorModel;
use crate::output::OutputMapper;
use crate::pid::{PositionHold, SpeedRegulator};
use crate::ramp::RampProfile;
use crate::state::{Modes, Setpoints};
use crate::status::{MotorEvent, TickReport};
use crate::types::{
    Polarity, PositionMode, RegulationMode, RunMode, StopMode, TachoState,
};

/// Capacity of the event channel; events past this are dropped.
pub const EVENT_CAPACITY: usize = 16;

pub struct TachoCore<D: MotorDriver> {
    pub(crate) output: OutputMapper<D>,
    pub(crate) decoder: Arc<EncoderDecoder>,
    pub(crate) estimator: SpeedEstimator,
    pub(crate) ramp: RampProfile,
    pub(crate) speed_pid: SpeedRegulator,
    /// Gains restored by `reset`.
    pub(crate) base_gains: PidGains,
    pub(crate) hold: PositionHold,
    pub(crate) model: MotorModel,
    pub(crate) sp: Setpoints,
    pub(crate) modes: Modes,
    pub(crate) state: TachoState,
    pub(crate) run: bool,
    pub(crate) estop: Option<NonZeroU32>,
    /// Position at the last stop; the decoder's live delta is added on top.
    pub(crate) resting: i32,
    pub(crate) control: ControlCfg,
    pub(crate) ramp_cfg: RampCfg,
    pub(crate) timebase: Timebase,
    pub(crate) events_tx: xch::Sender<MotorEvent>,
    pub(crate) events_rx: xch::Receiver<MotorEvent>,
    pub(crate) ticks: u64,
}

impl<D: MotorDriver> core::fmt::Debug for TachoCore<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TachoCore")
            .field("model", &self.model)
            .field("state", &self.state)
            .field("run", &self.run)
            .field("position", &self.position())
            .field("speed", &self.speed())
            .field("power", &self.duty_cycle())
            .finish_non_exhaustive()
    }
}

impl<D: MotorDriver> TachoCore<D> {
    /// Run one control tick stamped from the core's timebase.
    pub fn tick(&mut self) -> TickReport {
        let now = self.timebase.now_us();
        self.tick_at(now)
    }

    /// Run one control tick at `now_us` on the shared microsecond timeline.
    pub fn tick_at(&mut self, now_us: u64) -> TickReport {
        let speed_updated = self.estimator.update(&self.decoder, self.model, now_us);

        if self.run {
            if self.state.is_ramping() {
                self.ramp.count = self.ramp.count.saturating_add(self.control.tick_ms);
            }
            self.process();
            if self.run && self.modes.regulation.is_on() {
                self.regulate_speed();
            }
        } else {
            self.apply_stop_mode();
        }

        self.ticks = self.ticks.wrapping_add(1);
        TickReport {
            state: self.state,
            running: self.run,
            position: self.position(),
            speed: self.speed(),
            power: self.duty_cycle(),
            percent: self.ramp.percent,
            speed_updated,
        }
    }

    fn regulate_speed(&mut self) {
        let power = self
            .speed_pid
            .step(self.estimator.speed(), self.model.max_pulses_per_second());
        self.output.apply(power, self.modes.stop, true);
    }

    fn apply_stop_mode(&mut self) {
        match self.modes.stop {
            StopMode::Coast => self.output.command(Command::Coast),
            StopMode::Brake => self.output.command(Command::Brake),
            StopMode::Hold => {
                let power = self.hold.step(self.decoder.live());
                let regulated = self.modes.regulation.is_on();
                self.output.apply(power, StopMode::Hold, regulated);
            }
        }
    }

    pub(crate) fn emit(&self, event: MotorEvent) {
        if self.events_tx.try_send(event).is_err() {
            tracing::trace!(?event, "event channel full; dropping");
        }
    }

    // ── Read-only state ─────────────────────────────────────────────────────

    /// Resting position plus pulses counted since the last stop.
    #[inline]
    pub fn position(&self) -> i32 {
        self.resting.wrapping_add(self.decoder.live())
    }

    /// Measured speed in pulses per second.
    #[inline]
    pub fn speed(&self) -> i32 {
        self.estimator.speed()
    }

    /// Power currently applied, percent.
    #[inline]
    pub fn duty_cycle(&self) -> i32 {
        self.output.power()
    }

    #[inline]
    pub fn state(&self) -> TachoState {
        self.state
    }

    #[inline]
    pub fn ramp_percent(&self) -> i32 {
        self.ramp.percent
    }

    #[inline]
    pub fn ramp(&self) -> &RampProfile {
        &self.ramp
    }

    /// Power the speed regulator computed on its last step, before clamping.
    #[inline]
    pub fn regulator_power(&self) -> i32 {
        self.speed_pid.power()
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.run
    }

    /// Shared decoder handle for the edge context.
    pub fn decoder(&self) -> Arc<EncoderDecoder> {
        Arc::clone(&self.decoder)
    }

    pub fn timebase(&self) -> &Timebase {
        &self.timebase
    }

    pub fn events(&self) -> xch::Receiver<MotorEvent> {
        self.events_rx.clone()
    }

    pub fn driver(&self) -> &D {
        self.output.driver()
    }

    #[inline]
    pub fn tick_ms(&self) -> i32 {
        self.control.tick_ms
    }

    // ── Setpoints ───────────────────────────────────────────────────────────

    pub fn duty_cycle_sp(&self) -> i32 {
        self.sp.duty_cycle
    }

    pub fn set_duty_cycle_sp(&mut self, v: i32) {
        self.sp.duty_cycle = v.clamp(-100, 100);
    }

    pub fn speed_sp(&self) -> i32 {
        self.sp.speed
    }

    pub fn set_speed_sp(&mut self, v: i32) {
        self.sp.speed = v;
    }

    pub fn time_sp(&self) -> i32 {
        self.sp.time
    }

    pub fn set_time_sp(&mut self, v: i32) {
        self.sp.time = v.max(0);
    }

    pub fn position_sp(&self) -> i32 {
        self.sp.position
    }

    pub fn set_position_sp(&mut self, v: i32) {
        self.sp.position = v;
    }

    pub fn ramp_up_sp(&self) -> i32 {
        self.sp.ramp_up
    }

    pub fn set_ramp_up_sp(&mut self, v: i32) {
        self.sp.ramp_up = v.max(0);
    }

    pub fn ramp_down_sp(&self) -> i32 {
        self.sp.ramp_down
    }

    pub fn set_ramp_down_sp(&mut self, v: i32) {
        self.sp.ramp_down = v.max(0);
    }

    // ── Modes ───────────────────────────────────────────────────────────────

    pub fn run_mode(&self) -> RunMode {
        self.modes.run
    }

    pub fn set_run_mode(&mut self, m: RunMode) {
        self.modes.run = m;
    }

    pub fn regulation_mode(&self) -> RegulationMode {
        self.modes.regulation
    }

    pub fn set_regulation_mode(&mut self, m: RegulationMode) {
        self.modes.regulation = m;
    }

    pub fn stop_mode(&self) -> StopMode {
        self.modes.stop
    }

    pub fn set_stop_mode(&mut self, m: StopMode) {
        self.modes.stop = m;
    }

    pub fn position_mode(&self) -> PositionMode {
        self.modes.position
    }

    pub fn set_position_mode(&mut self, m: PositionMode) {
        self.modes.position = m;
    }

    pub fn polarity_mode(&self) -> Polarity {
        self.modes.polarity
    }

    /// Change output polarity and re-issue the current power so the bridge
    /// follows immediately.
    pub fn set_polarity_mode(&mut self, p: Polarity) {
        self.modes.polarity = p;
        self.decoder.set_polarities(p, self.modes.encoder);
        self.output.set_polarity(p);
        self.output
            .reissue(self.modes.stop, self.modes.regulation.is_on());
    }

    pub fn encoder_mode(&self) -> Polarity {
        self.modes.encoder
    }

    pub fn set_encoder_mode(&mut self, p: Polarity) {
        self.modes.encoder = p;
        self.decoder.set_polarities(self.modes.polarity, p);
    }

    // ── Speed regulator gains ───────────────────────────────────────────────

    pub fn gains(&self) -> PidGains {
        self.speed_pid.gains
    }

    pub fn set_kp(&mut self, v: i32) {
        self.speed_pid.gains.kp = v.max(0);
    }

    pub fn set_ki(&mut self, v: i32) {
        self.speed_pid.gains.ki = v.max(0);
    }

    pub fn set_kd(&mut self, v: i32) {
        self.speed_pid.gains.kd = v.max(0);
    }

    pub fn set_kf(&mut self, v: i32) {
        self.speed_pid.gains.kf = v.max(0);
    }

    // ── Model ───────────────────────────────────────────────────────────────

    pub fn model(&self) -> MotorModel {
        self.model
    }

    pub fn set_model(&mut self, model: MotorModel) {
        if model != self.model {
            tracing::debug!(from = %self.model, to = %model, "motor model changed");
        }
        self.model = model;
        self.estimator.reset();
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Redefine the current position as `p` without moving the motor.
    pub fn set_position(&mut self, p: i32) {
        self.decoder.take_live();
        self.resting = p;
        self.ramp.position_sp = p;
    }

    pub fn run(&self) -> bool {
        self.run
    }

    /// Start (`true`) or cancel (`false`) a move.
    ///
    /// Starting while a move is active is a no-op apart from keeping the
    /// run flag set. Cancelling a timed or forever move ramps down from the
    /// current speed; cancelling a position move stops at once.
    pub fn set_run(&mut self, run: bool) {
        if self.estop.is_some() {
            tracing::debug!("run request while estop armed; stopping");
            self.state = TachoState::Stop;
            self.run = true;
            self.process();
            return;
        }

        if run {
            if self.state == TachoState::Idle {
                self.state = match self.modes.run {
                    RunMode::Forever => TachoState::RunForever,
                    RunMode::Time => TachoState::SetupRampTime,
                    RunMode::Position => TachoState::SetupRampPosition,
                };
                tracing::debug!(state = %self.state, "move requested");
            }
        } else if self.state.is_setup() || self.state == TachoState::Idle {
            self.state = TachoState::Stop;
        } else if self.state != TachoState::Stop {
            match self.modes.run {
                RunMode::Forever | RunMode::Time => {
                    self.ramp.cancel();
                    self.state = TachoState::RampDown;
                }
                RunMode::Position => self.state = TachoState::Stop,
            }
            tracing::debug!(state = %self.state, "move cancelled");
        }
        self.run = true;
    }

    /// Current estop token, or 0 when disarmed.
    pub fn estop(&self) -> u32 {
        self.estop.map_or(0, NonZeroU32::get)
    }

    /// Arm the emergency stop, or disarm it with the exact token it was
    /// armed with. Any other value while armed is ignored.
    pub fn set_estop(&mut self, value: u32) {
        match self.estop {
            None => {
                let token = loop {
                    if let Some(t) = NonZeroU32::new(rand::random::<u32>()) {
                        break t;
                    }
                };
                self.estop = Some(token);
                self.modes.stop = StopMode::Coast;
                self.state = TachoState::Stop;
                self.run = true;
                self.process();
                tracing::info!(position = self.position(), "estop armed");
                self.emit(MotorEvent::EstopArmed);
            }
            Some(token) if token.get() == value => {
                self.estop = None;
                tracing::info!("estop released");
                self.emit(MotorEvent::EstopReleased);
            }
            Some(_) => {
                tracing::debug!("estop release with wrong token ignored");
            }
        }
    }

    /// Return every setpoint, mode and accumulator to its default and zero
    /// the position. The motor model is kept; gains go back to the values the
    /// core was built with.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.decoder.set_polarities(Polarity::Normal, Polarity::Normal);
        self.estimator.reset();
        self.ramp = RampProfile::default();
        self.speed_pid = SpeedRegulator::new(self.base_gains);
        self.hold.reset();
        self.sp = Setpoints::default();
        self.modes = Modes::default();
        self.state = TachoState::Idle;
        self.run = false;
        self.estop = None;
        self.resting = 0;
        self.output.set_polarity(Polarity::Normal);
        self.output.invalidate();
        self.output.apply(0, StopMode::Coast, false);
        tracing::info!(model = %self.model, "tacho reset");
    }
}
