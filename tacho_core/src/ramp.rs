//! Trapezoidal ramp bookkeeping.
//!
//! All values are milliseconds of ramp time. `count` advances by exactly one
//! tick period per tick while a move is ramping, so the profile is immune to
//! scheduling jitter.

/// One ramp phase. `full` is the duration of a complete 0↔100% ramp; a
/// shortened phase keeps `full` so the slope stays the same.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i32,
    pub end: i32,
    pub full: i32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RampProfile {
    pub up: Window,
    pub down: Window,
    /// Progress through the active phase, 0..=100.
    pub percent: i32,
    /// +1 or -1.
    pub direction: i32,
    /// Absolute target of the current (or last) position move.
    pub position_sp: i32,
    /// Elapsed ramp time.
    pub count: i32,
}

impl RampProfile {
    /// Lay out a timed (or forever, with `end` = horizon) trapezoid.
    ///
    /// When the two ramps would overlap, the crossover point is placed
    /// proportionally to the ramp-up/ramp-down setpoints.
    pub fn plan_timed(&mut self, end: i32, ramp_up: i32, ramp_down: i32) {
        self.up.start = 0;
        self.up.full = ramp_up;
        self.up.end = ramp_up;
        self.down.full = ramp_down;
        self.down.end = end;
        self.down.start = end.saturating_sub(ramp_down);

        if self.up.end > self.down.start {
            let sum = i64::from(ramp_up) + i64::from(ramp_down);
            self.up.end = if sum == 0 {
                0
            } else {
                (i64::from(end) * i64::from(ramp_up) / sum) as i32
            };
            self.down.start = self.up.end;
        }
    }

    /// Lay out a position move. The down window starts at the horizon and is
    /// pulled in once the stopping distance is reached.
    pub fn plan_position(&mut self, horizon: i32, ramp_up: i32, ramp_down: i32) {
        self.up.start = 0;
        self.up.full = ramp_up;
        self.up.end = ramp_up;
        self.down.full = ramp_down;
        self.down.start = horizon;
        self.down.end = horizon;
    }

    /// Shift the down window so that the move ends `stop_time` from now.
    pub fn pull_in_down(&mut self, stop_time: i32) {
        self.up.end = self.count;
        self.end_down_at(self.count.saturating_add(stop_time));
    }

    /// Forever runs keep a full ramp-down window just ahead of `count`.
    pub fn trail_down(&mut self) {
        self.down.start = self.count;
        self.down.end = self.count.saturating_add(self.down.full);
    }

    /// Target not reached at the end of the window: stretch it by `nudge`.
    pub fn nudge_down(&mut self, nudge: i32) {
        self.end_down_at(self.count.saturating_add(nudge));
    }

    /// Place the end of the down window, keeping its slope.
    pub fn end_down_at(&mut self, end: i32) {
        self.down.end = end;
        self.down.start = end.saturating_sub(self.down.full);
    }

    /// Decelerate from the current percent, keeping the ramp-down slope.
    pub fn cancel(&mut self) {
        let left = i64::from(self.down.full) * i64::from(self.percent) / 100;
        self.down.start = self.count;
        self.down.end = self.count.saturating_add(left.min(i64::from(i32::MAX)) as i32);
    }

    /// Progress for the up phase at the current count.
    #[inline]
    pub fn up_progress(&self) -> i32 {
        ramp_progress(self.count, self.up.full)
    }

    /// Remaining-fraction progress for the down phase at the current count.
    #[inline]
    pub fn down_progress(&self) -> i32 {
        ramp_progress(self.down.end.saturating_sub(self.count), self.down.full)
    }
}

/// Percent through a ramp of length `window` after `elapsed` ms.
///
/// Returns 100 when the window has (nearly) elapsed or is empty; the
/// two-tick slack makes sure a ramp always reaches full power before it ends.
#[inline]
pub fn ramp_progress(elapsed: i32, window: i32) -> i32 {
    if window <= elapsed.saturating_add(2) || window == 0 {
        return 100;
    }
    (i64::from(elapsed) * 100 / i64::from(window)).clamp(0, 100) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 100)]
    #[case(10, 12, 100)]
    #[case(10, 13, 76)]
    #[case(0, 500, 0)]
    #[case(248, 500, 49)]
    #[case(498, 500, 100)]
    #[case(-5, 100, 0)]
    fn progress_boundaries(#[case] elapsed: i32, #[case] window: i32, #[case] want: i32) {
        assert_eq!(ramp_progress(elapsed, window), want);
    }

    #[test]
    fn timed_plan_without_overlap() {
        let mut r = RampProfile::default();
        r.plan_timed(2_000, 500, 300);
        assert_eq!(r.up, Window { start: 0, end: 500, full: 500 });
        assert_eq!(r.down, Window { start: 1_700, end: 2_000, full: 300 });
    }

    #[test]
    fn timed_plan_with_overlap_splits_proportionally() {
        let mut r = RampProfile::default();
        r.plan_timed(400, 600, 200);
        assert_eq!(r.up.end, 300);
        assert_eq!(r.down.start, 300);
        assert_eq!(r.down.end, 400);
    }

    #[test]
    fn zero_length_timed_plan() {
        let mut r = RampProfile::default();
        r.plan_timed(0, 0, 0);
        assert_eq!(r.up.end, 0);
        assert_eq!(r.down.start, 0);
    }

    #[test]
    fn cancel_scales_by_percent() {
        let mut r = RampProfile { count: 1_000, percent: 50, ..Default::default() };
        r.down.full = 400;
        r.cancel();
        assert_eq!(r.down.start, 1_000);
        assert_eq!(r.down.end, 1_200);
    }

    #[test]
    fn windows_saturate_at_the_end_of_count() {
        let mut r = RampProfile { count: i32::MAX, percent: 100, ..Default::default() };
        r.down.full = 200;
        r.trail_down();
        assert_eq!(r.down.end, i32::MAX);
        r.nudge_down(100);
        assert_eq!(r.down, Window { start: i32::MAX - 200, end: i32::MAX, full: 200 });
        r.pull_in_down(50);
        assert_eq!(r.down.end, i32::MAX);
        r.cancel();
        assert_eq!(r.down.end, i32::MAX);
        assert_eq!(r.down_progress(), 0);
    }

    #[test]
    fn nudge_extends_an_expired_window() {
        let mut r = RampProfile { count: 1_000, ..Default::default() };
        r.down.full = 200;
        r.nudge_down(100);
        assert_eq!(r.down, Window { start: 900, end: 1_100, full: 200 });
    }

    proptest! {
        #[test]
        fn progress_is_monotonic(window in 1i32..100_000, a in 0i32..100_000, b in 0i32..100_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ramp_progress(lo, window) <= ramp_progress(hi, window));
        }

        #[test]
        fn progress_reaches_full_before_window_end(window in 0i32..100_000) {
            prop_assert_eq!(ramp_progress(window - 2, window), 100);
            prop_assert!((0..=100).contains(&ramp_progress(window / 2, window)));
        }
    }
}
