//! Common time/period helpers for tacho_core.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of microseconds in one millisecond.
pub const MICROS_PER_MS: u64 = 1_000;

/// Tick period in microseconds for a tick length in milliseconds.
/// - Clamps `tick_ms` to at least 1.
#[inline]
pub fn tick_period_us(tick_ms: i32) -> u64 {
    u64::from(tick_ms.max(1).unsigned_abs()) * MICROS_PER_MS
}

/// Ticks needed to cover `ms` milliseconds, rounding up.
#[inline]
pub fn ticks_for_ms(ms: u64, tick_ms: i32) -> u64 {
    ms.div_ceil(u64::from(tick_ms.max(1).unsigned_abs()))
}
