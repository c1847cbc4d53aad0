//! Single-producer/single-consumer ring of edge timestamps.
//!
//! The edge handler is the only writer: it stores the slot, then publishes
//! the new head with `Release`. The tick reads the head with `Acquire` and
//! walks backwards from it. A reader racing a writer sees at most one stale
//! slot, which the estimator tolerates.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Number of timestamps retained.
pub const RING_CAPACITY: usize = 128;

pub struct SampleRing {
    slots: [AtomicU64; RING_CAPACITY],
    head: AtomicUsize,
}

impl SampleRing {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU64::new(0)),
            head: AtomicUsize::new(0),
        }
    }

    /// Index of the most recently written slot.
    #[inline]
    pub fn head(&self) -> usize {
        self.head.load(Ordering::Acquire)
    }

    #[inline]
    pub fn get(&self, idx: usize) -> u64 {
        self.slots[idx % RING_CAPACITY].load(Ordering::Relaxed)
    }

    /// Timestamp `n` slots before `head` (`n = 0` is `head` itself).
    #[inline]
    pub fn back(&self, head: usize, n: usize) -> u64 {
        self.get(head + RING_CAPACITY - (n % RING_CAPACITY))
    }

    #[inline]
    pub fn latest(&self) -> u64 {
        self.get(self.head())
    }

    /// Append into the next slot and publish it as the new head.
    #[inline]
    pub fn push(&self, ts: u64) {
        let next = (self.head.load(Ordering::Relaxed) + 1) % RING_CAPACITY;
        self.slots[next].store(ts, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
    }

    /// Replace the head slot in place (bounce rejection).
    #[inline]
    pub fn overwrite_head(&self, ts: u64) {
        let head = self.head.load(Ordering::Relaxed);
        self.slots[head].store(ts, Ordering::Release);
    }

    pub fn reset(&self) {
        for s in &self.slots {
            s.store(0, Ordering::Relaxed);
        }
        self.head.store(0, Ordering::Release);
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SampleRing")
            .field("head", &self.head())
            .field("latest", &self.latest())
            .finish()
    }
}
