//! Monotonic clock, derived from the PIT tick counter.
//!
//! There is a single timer source (the legacy PIT driving IRQ0 at
//! [`crate::kernel_services::platform::timer_frequency`] Hz); this module
//! just converts ticks to nanoseconds.
//!
//! All functions are safe to call from any context (interrupt, kernel thread,
//! syscall handler). Before the platform services are wired during early boot,
//! every accessor returns `0`.

use crate::kernel_services::platform;

/// Returns the monotonic clock value in nanoseconds since boot.
#[inline]
pub fn monotonic_ns() -> u64 {
    let freq = platform::timer_frequency();
    if freq == 0 {
        return 0;
    }
    let ticks = platform::timer_ticks();
    (ticks as u128 * 1_000_000_000u128 / freq as u128) as u64
}

/// Returns system uptime in milliseconds.
///
/// Convenience wrapper around [`monotonic_ns`] with millisecond granularity.
/// Replaces `irq_get_timer_ticks()` tick-counting for time queries.
#[inline]
pub fn uptime_ms() -> u64 {
    monotonic_ns() / 1_000_000
}
