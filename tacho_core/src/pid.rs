//! Integer PID regulators.
//!
//! Both regulators run once per tick and return a power in percent. Neither
//! touches the driver; the caller hands the result to the output mapper.

use crate::config::{HoldCfg, PidGains};

/// Closed-loop speed regulator with conditional-integration anti-windup.
#[derive(Debug, Clone, Default)]
pub struct SpeedRegulator {
    pub gains: PidGains,
    target: i32,
    p: i32,
    i: i32,
    d: i32,
    prev_speed: i32,
    /// Last computed power before output clamping.
    power: i32,
}

impl SpeedRegulator {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            ..Default::default()
        }
    }

    #[inline]
    pub fn target(&self) -> i32 {
        self.target
    }

    #[inline]
    pub fn set_target(&mut self, target: i32) {
        self.target = target;
    }

    /// Power computed on the last step.
    #[inline]
    pub fn power(&self) -> i32 {
        self.power
    }

    #[inline]
    pub fn integral(&self) -> i32 {
        self.i
    }

    /// One regulator step against the measured `speed`, target clamped to
    /// `±max_pps`.
    pub fn step(&mut self, speed: i32, max_pps: i32) -> i32 {
        self.target = self.target.clamp(-max_pps, max_pps);
        if self.target == 0 {
            self.power = 0;
            self.prev_speed = speed;
            return 0;
        }

        let err = self.target - speed;
        self.p = err;
        self.i = self.i.saturating_add(err);
        self.d = speed - self.prev_speed;
        self.prev_speed = speed;

        let kf = if self.gains.kf == 0 { 1 } else { self.gains.kf };
        let sum = i64::from(self.p) * i64::from(self.gains.kp)
            + i64::from(self.i) * i64::from(self.gains.ki)
            + i64::from(self.d) * i64::from(self.gains.kd);
        let power = saturate(sum / i64::from(kf));

        if power.abs() > 100 {
            self.i -= err;
        }
        self.power = power;
        power
    }

    /// Clear accumulators and the target. Gains are kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.gains);
    }
}

/// Regulator that holds the resting position after a stop in Hold mode.
#[derive(Debug, Clone, Default)]
pub struct PositionHold {
    cfg: HoldCfg,
    i: i32,
    prev_err: i32,
}

impl PositionHold {
    pub fn new(cfg: HoldCfg) -> Self {
        Self {
            cfg,
            i: 0,
            prev_err: 0,
        }
    }

    /// Step against the live delta (distance moved since the stop).
    ///
    /// Works in `i64` and saturates into `i32`, so a large displacement
    /// (a cancelled long move) keeps its sign instead of wrapping.
    pub fn step(&mut self, live: i32) -> i32 {
        let err = -i64::from(live);
        let p = err * i64::from(self.cfg.kp);
        let i = i64::from(self.i) * i64::from(self.cfg.decay_percent) / 100 + err;
        self.i = saturate(i);
        let d = ((err - i64::from(self.prev_err)) * i64::from(self.cfg.kd) / 2) * 2;
        self.prev_err = saturate(err);
        saturate((p + i64::from(self.i) + d) / 100)
    }

    pub fn reset(&mut self) {
        self.i = 0;
        self.prev_err = 0;
    }
}

#[inline]
fn saturate(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_target_forces_zero_power() {
        let mut pid = SpeedRegulator::new(PidGains::default());
        pid.set_target(0);
        assert_eq!(pid.step(300, 900), 0);
        assert_eq!(pid.integral(), 0);
    }

    #[test]
    fn target_is_clamped_to_model_max() {
        let mut pid = SpeedRegulator::new(PidGains::default());
        pid.set_target(5_000);
        pid.step(0, 900);
        assert_eq!(pid.target(), 900);
    }

    #[test]
    fn saturated_output_does_not_accumulate() {
        let mut pid = SpeedRegulator::new(PidGains::default());
        pid.set_target(900);
        // err 900 → P term alone is 100
        for _ in 0..50 {
            pid.step(0, 900);
        }
        assert!(pid.integral() <= 900, "integral wound up to {}", pid.integral());
    }

    #[test]
    fn tracks_small_error_with_integral() {
        let mut pid = SpeedRegulator::new(PidGains::default());
        pid.set_target(400);
        let first = pid.step(390, 900);
        let second = pid.step(390, 900);
        assert!(second >= first);
        assert_eq!(pid.integral(), 20);
    }

    #[test]
    fn hold_pushes_back_against_displacement() {
        let mut hold = PositionHold::new(HoldCfg::default());
        assert!(hold.step(5) < 0);
        let mut hold = PositionHold::new(HoldCfg::default());
        assert!(hold.step(-5) > 0);
        let mut hold = PositionHold::new(HoldCfg::default());
        assert_eq!(hold.step(0), 0);
    }

    #[test]
    fn hold_first_step_matches_gains() {
        let mut hold = PositionHold::new(HoldCfg::default());
        // err -3: P -1200, I -3, D ((-3) * 4 / 2) * 2 = -12
        assert_eq!(hold.step(3), (-1_200 - 3 - 12) / 100);
    }

    #[test]
    fn hold_keeps_sign_under_large_displacement() {
        let mut hold = PositionHold::new(HoldCfg::default());
        for _ in 0..2_000 {
            assert!(hold.step(-1_000_000) > 0);
        }
        let mut hold = PositionHold::new(HoldCfg::default());
        for _ in 0..2_000 {
            assert!(hold.step(i32::MAX) < 0);
        }
        assert!(hold.step(i32::MIN) > 0);
    }
}
