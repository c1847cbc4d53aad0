//! Edge-driven encoder decoder.
//!
//! Runs in the edge context: every method called from `on_edge` is a plain
//! atomic load or store, so the handler never blocks and never allocates.
//! The tick side reads the same atomics and tolerates one stale sample.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicUsize, Ordering};

use tacho_traits::{EdgeSink, Polarity};

use crate::config::DecoderCfg;
use crate::ring::{RING_CAPACITY, SampleRing};
use crate::types::Direction;

/// Upper bound of the stable-direction streak.
pub const STREAK_CAP: usize = RING_CAPACITY - 1;

/// Resolve the rotation sense of one edge.
///
/// Equal line levels are the normal phase. Output and encoder polarity each
/// flip the result through the same 2×2 table, so two inversions cancel.
#[inline]
pub const fn resolve_direction(
    int_level: bool,
    dir_level: bool,
    output: Polarity,
    encoder: Polarity,
) -> Direction {
    let inverted = (int_level != dir_level) ^ output.is_inversed() ^ encoder.is_inversed();
    if inverted {
        Direction::Reverse
    } else {
        Direction::Forward
    }
}

pub struct EncoderDecoder {
    ring: SampleRing,
    /// Position accrued since the last stop.
    live: AtomicI32,
    direction: AtomicU8,
    streak: AtomicUsize,
    new_sample: AtomicBool,
    /// Last estimated speed in percent of the model's max rate.
    speed_percent: AtomicI32,
    output_inversed: AtomicBool,
    encoder_inversed: AtomicBool,
    min_pulse_interval_us: u64,
    high_speed_percent: i32,
}

impl EncoderDecoder {
    pub fn new(cfg: &DecoderCfg) -> Self {
        Self {
            ring: SampleRing::new(),
            live: AtomicI32::new(0),
            direction: AtomicU8::new(Direction::Unknown as u8),
            streak: AtomicUsize::new(0),
            new_sample: AtomicBool::new(false),
            speed_percent: AtomicI32::new(0),
            output_inversed: AtomicBool::new(false),
            encoder_inversed: AtomicBool::new(false),
            min_pulse_interval_us: cfg.min_pulse_interval_us,
            high_speed_percent: cfg.high_speed_percent,
        }
    }

    /// Handle one edge on the interrupt line.
    pub fn on_edge(&self, int_level: bool, dir_level: bool, timestamp_us: u64) {
        let prev_dir = self.direction();
        let mut next_dir = prev_dir;
        let mut bounce = false;

        if self.speed_percent.load(Ordering::Relaxed).abs() > self.high_speed_percent {
            // pin levels are unreliable at this slew rate
            self.bump_streak();
        } else {
            next_dir = resolve_direction(
                int_level,
                dir_level,
                self.output_polarity(),
                self.encoder_polarity(),
            );
            let interval = timestamp_us.saturating_sub(self.ring.latest());
            if prev_dir != Direction::Unknown && interval < self.min_pulse_interval_us {
                bounce = true;
                self.live.fetch_sub(prev_dir.step(), Ordering::Relaxed);
            } else if next_dir == prev_dir {
                self.bump_streak();
            } else {
                self.streak.store(0, Ordering::Relaxed);
            }
        }

        self.direction.store(next_dir as u8, Ordering::Relaxed);
        if bounce {
            self.ring.overwrite_head(timestamp_us);
        } else {
            self.ring.push(timestamp_us);
        }
        self.live.fetch_add(next_dir.step(), Ordering::Relaxed);
        self.new_sample.store(true, Ordering::Release);
    }

    #[inline]
    fn bump_streak(&self) {
        let s = self.streak.load(Ordering::Relaxed);
        if s < STREAK_CAP {
            self.streak.store(s + 1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn ring(&self) -> &SampleRing {
        &self.ring
    }

    #[inline]
    pub fn live(&self) -> i32 {
        self.live.load(Ordering::Relaxed)
    }

    /// Subtract the current live delta and return it. Edges landing
    /// concurrently stay in the live delta.
    pub fn take_live(&self) -> i32 {
        let v = self.live.load(Ordering::Relaxed);
        self.live.fetch_sub(v, Ordering::Relaxed);
        v
    }

    #[inline]
    pub fn adjust_live(&self, delta: i32) {
        self.live.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        Direction::from_u8(self.direction.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn streak(&self) -> usize {
        self.streak.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reset_streak(&self) {
        self.streak.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn has_new_sample(&self) -> bool {
        self.new_sample.load(Ordering::Acquire)
    }

    #[inline]
    pub fn clear_new_sample(&self) {
        self.new_sample.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn publish_speed_percent(&self, percent: i32) {
        self.speed_percent.store(percent, Ordering::Relaxed);
    }

    pub fn set_polarities(&self, output: Polarity, encoder: Polarity) {
        self.output_inversed
            .store(output.is_inversed(), Ordering::Relaxed);
        self.encoder_inversed
            .store(encoder.is_inversed(), Ordering::Relaxed);
    }

    fn output_polarity(&self) -> Polarity {
        if self.output_inversed.load(Ordering::Relaxed) {
            Polarity::Inversed
        } else {
            Polarity::Normal
        }
    }

    fn encoder_polarity(&self) -> Polarity {
        if self.encoder_inversed.load(Ordering::Relaxed) {
            Polarity::Inversed
        } else {
            Polarity::Normal
        }
    }

    /// Zero the ring, counters and flags. Polarity flags are left to the owner.
    pub fn reset(&self) {
        self.ring.reset();
        self.live.store(0, Ordering::Relaxed);
        self.direction
            .store(Direction::Unknown as u8, Ordering::Relaxed);
        self.streak.store(0, Ordering::Relaxed);
        self.new_sample.store(false, Ordering::Relaxed);
        self.speed_percent.store(0, Ordering::Relaxed);
    }
}

impl EdgeSink for EncoderDecoder {
    #[inline]
    fn on_edge(&self, int_level: bool, dir_level: bool, timestamp_us: u64) {
        Self::on_edge(self, int_level, dir_level, timestamp_us);
    }
}

impl core::fmt::Debug for EncoderDecoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EncoderDecoder")
            .field("live", &self.live())
            .field("direction", &self.direction())
            .field("streak", &self.streak())
            .field("head", &self.ring.head())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use Polarity::{Inversed as I, Normal as N};

    fn decoder() -> EncoderDecoder {
        EncoderDecoder::new(&DecoderCfg::default())
    }

    #[rstest]
    #[case(false, false, N, N, Direction::Forward)]
    #[case(true, true, N, N, Direction::Forward)]
    #[case(true, false, N, N, Direction::Reverse)]
    #[case(false, true, N, N, Direction::Reverse)]
    #[case(false, false, I, N, Direction::Reverse)]
    #[case(true, true, I, N, Direction::Reverse)]
    #[case(true, false, I, N, Direction::Forward)]
    #[case(false, true, I, N, Direction::Forward)]
    #[case(false, false, N, I, Direction::Reverse)]
    #[case(true, true, N, I, Direction::Reverse)]
    #[case(true, false, N, I, Direction::Forward)]
    #[case(false, true, N, I, Direction::Forward)]
    #[case(false, false, I, I, Direction::Forward)]
    #[case(true, true, I, I, Direction::Forward)]
    #[case(true, false, I, I, Direction::Reverse)]
    #[case(false, true, I, I, Direction::Reverse)]
    fn truth_table(
        #[case] int_level: bool,
        #[case] dir_level: bool,
        #[case] output: Polarity,
        #[case] encoder: Polarity,
        #[case] want: Direction,
    ) {
        assert_eq!(resolve_direction(int_level, dir_level, output, encoder), want);

        let d = decoder();
        d.set_polarities(output, encoder);
        d.on_edge(int_level, dir_level, 10_000);
        assert_eq!(d.direction(), want);
        assert_eq!(d.live(), want.step());
    }

    #[test]
    fn steady_edges_build_streak_and_ring() {
        let d = decoder();
        for i in 1..=10u64 {
            d.on_edge(i % 2 == 0, i % 2 == 0, i * 2_000);
        }
        assert_eq!(d.live(), 10);
        // first edge changes direction from unknown
        assert_eq!(d.streak(), 9);
        assert_eq!(d.ring().head(), 10);
        assert_eq!(d.ring().latest(), 20_000);
        assert!(d.has_new_sample());
    }

    #[test]
    fn direction_flip_resets_streak() {
        let d = decoder();
        for i in 1..=5u64 {
            d.on_edge(true, true, i * 2_000);
        }
        d.on_edge(true, false, 12_000);
        assert_eq!(d.streak(), 0);
        assert_eq!(d.live(), 4);
    }

    #[test]
    fn bounce_overwrites_head_and_undoes_previous_step() {
        let d = decoder();
        d.on_edge(true, true, 10_000);
        d.on_edge(false, true, 20_000);
        assert_eq!(d.live(), 0);
        let head = d.ring().head();

        // chatter 15 µs later looks like a forward edge
        d.on_edge(true, true, 20_015);
        assert_eq!(d.ring().head(), head);
        assert_eq!(d.ring().latest(), 20_015);
        assert_eq!(d.live(), 2);
        assert_eq!(d.direction(), Direction::Forward);
    }

    #[test]
    fn first_edge_is_never_a_bounce() {
        let d = decoder();
        d.on_edge(true, true, 100);
        assert_eq!(d.live(), 1);
        assert_eq!(d.ring().head(), 1);
    }

    #[test]
    fn streak_is_capped() {
        let d = decoder();
        for i in 1..=300u64 {
            d.on_edge(true, true, i * 1_000);
        }
        assert_eq!(d.streak(), STREAK_CAP);
    }

    #[test]
    fn high_speed_keeps_last_direction() {
        let d = decoder();
        d.on_edge(true, true, 1_000);
        d.publish_speed_percent(80);
        // levels now claim reverse, and the interval is below the bounce threshold
        d.on_edge(true, false, 1_100);
        assert_eq!(d.direction(), Direction::Forward);
        assert_eq!(d.live(), 2);
        assert_eq!(d.streak(), 1);
        assert_eq!(d.ring().head(), 2);
    }

    #[test]
    fn take_live_returns_and_clears() {
        let d = decoder();
        d.on_edge(true, true, 1_000);
        d.on_edge(false, false, 3_000);
        assert_eq!(d.take_live(), 2);
        assert_eq!(d.live(), 0);
    }
}
