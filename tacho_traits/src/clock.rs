use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for edge timestamps and tick pacing.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - us_since(): elapsed microseconds from an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Microseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn us_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_micros()).unwrap_or(u64::MAX)
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// A shared microsecond timeline.
///
/// The control core and every edge source must stamp from the same
/// `Timebase`, otherwise pulse intervals and stall detection compare
/// unrelated clocks.
#[derive(Clone)]
pub struct Timebase {
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl Timebase {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        Self { clock, epoch }
    }

    /// Microseconds since this timebase was created.
    #[inline]
    pub fn now_us(&self) -> u64 {
        self.clock.us_since(self.epoch)
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicClock::new()))
    }
}

impl core::fmt::Debug for Timebase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Timebase")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::*;

    /// Deterministic test clock whose time can be advanced manually.
    ///
    /// now() = origin + offset
    /// sleep(d) advances internal time by d without actually sleeping.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: std::sync::Arc<std::sync::Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: std::sync::Arc::new(std::sync::Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
            self.origin + off
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}
