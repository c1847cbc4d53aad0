//! Speed estimation from the edge timestamp ring.
//!
//! The averaging window widens with speed so that slow motors still get a
//! fresh estimate every few pulses while fast ones average out jitter.

use crate::decoder::EncoderDecoder;
use crate::model::MotorModel;
use crate::types::Direction;
use crate::util::MICROS_PER_SEC;

#[derive(Debug, Default, Clone, Copy)]
pub struct SpeedEstimator {
    /// Pulses per second, signed by direction.
    speed: i32,
    window: usize,
}

impl SpeedEstimator {
    pub const fn new() -> Self {
        Self {
            speed: 0,
            window: 0,
        }
    }

    #[inline]
    pub const fn speed(&self) -> i32 {
        self.speed
    }

    /// Window used for the last estimate.
    #[inline]
    pub const fn window(&self) -> usize {
        self.window
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Refresh the estimate. Returns true when the speed was recomputed or
    /// forced to zero by a stall.
    pub fn update(&mut self, decoder: &EncoderDecoder, model: MotorModel, now_us: u64) -> bool {
        let ring = decoder.ring();
        let head = ring.head();
        let streak = decoder.streak();
        let cpp = model.counts_per_pulse();
        let mut changed = false;

        if streak >= 1 {
            let diff = ring.back(head, 0).wrapping_sub(ring.back(head, 1)) | 1;
            self.window = model.window_for_band(cpp / diff);
        } else {
            self.window = model.sample_windows()[0];
        }

        if decoder.has_new_sample() && streak >= self.window {
            let span = ring.back(head, 0).wrapping_sub(ring.back(head, self.window)) | 1;
            let pps = (MICROS_PER_SEC * self.window as u64 / span).min(i32::MAX as u64) as i32;
            self.speed = if decoder.direction() == Direction::Reverse {
                -pps
            } else {
                pps
            };
            decoder.clear_new_sample();
            changed = true;
        } else if now_us.saturating_sub(ring.latest()) > cpp {
            self.speed = 0;
            decoder.reset_streak();
            changed = true;
        }

        let percent = i64::from(self.speed) * 100 / i64::from(model.max_pulses_per_second());
        decoder.publish_speed_percent(percent as i32);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderCfg;

    fn feed(d: &EncoderDecoder, n: u64, spacing_us: u64, forward: bool) -> u64 {
        let mut ts = 0;
        for i in 1..=n {
            ts = i * spacing_us;
            d.on_edge(true, forward, ts);
        }
        ts
    }

    #[test]
    fn steady_forward_speed_uses_band_window() {
        let d = EncoderDecoder::new(&DecoderCfg::default());
        let last = feed(&d, 17, 2_000, true);
        let mut est = SpeedEstimator::new();
        assert!(est.update(&d, MotorModel::Large, last + 10));
        // band 100_000 / 2_001 = 49 selects the second window
        assert_eq!(est.window(), 16);
        assert_eq!(est.speed(), 499);
        assert!(!d.has_new_sample());
    }

    #[test]
    fn reverse_speed_is_negative() {
        let d = EncoderDecoder::new(&DecoderCfg::default());
        let last = feed(&d, 20, 4_000, false);
        let mut est = SpeedEstimator::new();
        assert!(est.update(&d, MotorModel::Large, last));
        assert!(est.speed() < 0);
        assert_eq!(est.window(), 4);
        assert_eq!(est.speed(), -(1_000_000 * 4 / 16_001) as i32);
    }

    #[test]
    fn stall_forces_zero_and_resets_streak() {
        let d = EncoderDecoder::new(&DecoderCfg::default());
        let last = feed(&d, 20, 2_000, true);
        let mut est = SpeedEstimator::new();
        est.update(&d, MotorModel::Large, last);
        assert!(est.speed() > 0);

        assert!(est.update(&d, MotorModel::Large, last + 100_001));
        assert_eq!(est.speed(), 0);
        assert_eq!(d.streak(), 0);
    }

    #[test]
    fn too_few_edges_keep_previous_estimate() {
        let d = EncoderDecoder::new(&DecoderCfg::default());
        let last = feed(&d, 3, 2_000, true);
        let mut est = SpeedEstimator::new();
        assert!(!est.update(&d, MotorModel::Large, last + 1));
        assert_eq!(est.speed(), 0);
    }
}
