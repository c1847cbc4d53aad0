//! Ramp state machine.
//!
//! Each state step returns the next state and whether it must be processed
//! within the same tick. Setup states always chain straight into `RampUp`,
//! and `Stop` chains into `Idle`, so a move starts and ends without losing a
//! tick.

use tacho_traits::MotorDriver;

use crate::core::TachoCore;
use crate::status::MotorEvent;
use crate::types::{PositionMode, RunMode, TachoState};

/// Upper bound on chained transitions per tick. The longest real chain is a
/// zero-length move running from its setup state through to Idle.
const MAX_CHAIN: usize = 8;

impl<D: MotorDriver> TachoCore<D> {
    /// Run the state machine until a state settles for this tick.
    pub(crate) fn process(&mut self) {
        for _ in 0..MAX_CHAIN {
            let (next, reprocess) = self.step_state();
            if next != self.state {
                tracing::debug!(from = %self.state, to = %next, count = self.ramp.count, "state");
                self.state = next;
            }
            if !reprocess {
                return;
            }
        }
        tracing::warn!(state = %self.state, "state machine did not settle within one tick");
    }

    fn step_state(&mut self) -> (TachoState, bool) {
        match self.state {
            TachoState::RunForever => {
                let horizon = self.ramp_cfg.forever_horizon_ms;
                self.plan_timed(horizon);
                (TachoState::SetupRampRegulation, true)
            }
            TachoState::SetupRampTime => {
                self.plan_timed(self.sp.time);
                (TachoState::SetupRampRegulation, true)
            }
            TachoState::SetupRampPosition => {
                self.plan_position();
                (TachoState::SetupRampRegulation, true)
            }
            TachoState::SetupRampRegulation => {
                self.ramp.count = 0;
                (TachoState::RampUp, true)
            }
            TachoState::RampUp => {
                if self.modes.run == RunMode::Position {
                    self.adjust_down_window();
                }
                // the const phase runs at whatever percent the ramp reached
                self.ramp.percent = self.ramp.up_progress();
                self.update_output();
                if self.ramp.count >= self.ramp.up.end {
                    return (TachoState::RampConst, true);
                }
                (TachoState::RampUp, false)
            }
            TachoState::RampConst => {
                match self.modes.run {
                    RunMode::Forever => self.ramp.trail_down(),
                    RunMode::Time => {
                        if self.ramp.count >= self.ramp.down.start {
                            return (TachoState::RampDown, true);
                        }
                    }
                    RunMode::Position => {
                        self.adjust_down_window();
                        if self.ramp.count >= self.ramp.down.start {
                            return (TachoState::PositionRampDown, true);
                        }
                    }
                }
                self.update_output();
                (TachoState::RampConst, false)
            }
            TachoState::PositionRampDown => {
                if self.target_crossed() {
                    self.ramp.end_down_at(self.ramp.count);
                } else if self.ramp.down.end <= self.ramp.count {
                    self.ramp.nudge_down(self.ramp_cfg.nudge_ms);
                } else {
                    self.ramp.end_down_at(self.ramp.down.end);
                }
                self.ramp_down()
            }
            TachoState::RampDown => self.ramp_down(),
            TachoState::Stop => {
                self.stop_motor();
                (TachoState::Idle, true)
            }
            TachoState::Idle => {
                if self.run {
                    self.run = false;
                    self.emit(MotorEvent::StateChanged {
                        state: TachoState::Idle,
                        position: self.position(),
                    });
                }
                (TachoState::Idle, false)
            }
        }
    }

    fn ramp_down(&mut self) -> (TachoState, bool) {
        if self.ramp.count >= self.ramp.down.end {
            return (TachoState::Stop, true);
        }
        self.ramp.percent = self.ramp.down_progress();
        self.update_output();
        (self.state_after_down(), false)
    }

    // PositionRampDown stays put so the crossing check runs every tick.
    fn state_after_down(&self) -> TachoState {
        if self.state == TachoState::PositionRampDown {
            TachoState::PositionRampDown
        } else {
            TachoState::RampDown
        }
    }

    fn plan_timed(&mut self, end: i32) {
        let active = self.sp.active(self.modes.regulation);
        self.ramp.direction = if active < 0 { -1 } else { 1 };
        self.ramp.plan_timed(end, self.sp.ramp_up, self.sp.ramp_down);
    }

    fn plan_position(&mut self) {
        let target = match self.modes.position {
            PositionMode::Absolute => self.sp.position,
            PositionMode::Relative => self.ramp.position_sp.wrapping_add(self.sp.position),
        };
        self.ramp.position_sp = target;
        self.ramp.direction = if target >= self.position() { 1 } else { -1 };
        let horizon = self.ramp_cfg.forever_horizon_ms;
        self.ramp.plan_position(horizon, self.sp.ramp_up, self.sp.ramp_down);
    }

    /// Pull the down window in once the estimated stopping distance reaches
    /// the target.
    fn adjust_down_window(&mut self) {
        let speed = self.estimator.speed();
        let stop_time = if self.modes.regulation.is_on() {
            scale_abs(self.sp.ramp_down, speed, self.sp.speed)
        } else {
            scale_abs(self.sp.ramp_down, self.output.power(), self.sp.duty_cycle)
        };
        let distance = (i64::from(speed) * i64::from(stop_time) * 7 / 20_000).abs();
        let position = i64::from(self.position());
        let target = i64::from(self.ramp.position_sp);

        let within = if self.ramp.direction > 0 {
            position + distance >= target
        } else {
            position - distance <= target
        };
        if within {
            self.ramp.pull_in_down(stop_time);
        }
    }

    fn target_crossed(&self) -> bool {
        let position = self.position();
        if self.ramp.direction > 0 {
            position >= self.ramp.position_sp
        } else {
            position <= self.ramp.position_sp
        }
    }

    /// Translate the ramp percent into a power (open loop) or a regulator
    /// target (closed loop).
    fn update_output(&mut self) {
        let percent = self.ramp.percent;
        let direction = self.ramp.direction;
        let position_mode = self.modes.run == RunMode::Position;
        let shape = |sp: i32| {
            let v = (i64::from(sp) * i64::from(percent) / 100) as i32;
            if position_mode {
                direction * v.abs()
            } else {
                v
            }
        };

        if self.modes.regulation.is_on() {
            let target = shape(self.sp.speed);
            self.speed_pid.set_target(target);
        } else {
            let power = shape(self.sp.duty_cycle);
            self.output.apply(power, self.modes.stop, false);
        }
    }

    /// Fold the move into the resting position and drop all output.
    fn stop_motor(&mut self) {
        if self.modes.run == RunMode::Position {
            // keep the reported position; the remainder becomes hold error
            let target = self.ramp.position_sp;
            self.decoder.adjust_live(self.resting.wrapping_sub(target));
            self.resting = target;
        } else {
            let live = self.decoder.take_live();
            self.resting = self.resting.wrapping_add(live);
        }
        self.speed_pid.reset();
        self.hold.reset();
        self.ramp.percent = 0;
        self.output.apply(0, self.modes.stop, self.modes.regulation.is_on());
    }
}

/// `base × |num| / |den|`, 0 when `den` is 0.
#[inline]
fn scale_abs(base: i32, num: i32, den: i32) -> i32 {
    if den == 0 {
        return 0;
    }
    let v = i64::from(base) * i64::from(num).abs() / i64::from(den).abs();
    v.clamp(0, i64::from(i32::MAX)) as i32
}
