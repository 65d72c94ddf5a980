//! Bounded spin/backoff primitive.
//!
//! [`wait_ticks`] busy-polls a monotonic cycle counter until the requested
//! number of ticks has elapsed. Each iteration issues a pause hint and an
//! acquire fence so a spinning core re-observes the shared slot it is
//! waiting on instead of a stale cached copy.
//!
//! On x86/x86_64 the tick source is the TSC; elsewhere it falls back to
//! [`minstant::Instant`] nanoseconds. Tick-to-duration conversion never
//! leaks out of this module: callers think purely in ticks.

use std::sync::atomic::{Ordering, fence};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[inline]
fn read_ticks() -> u64 {
    // SAFETY: rdtsc has no preconditions; it only reads the timestamp counter.
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_rdtsc()
    }
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::x86::_rdtsc()
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
#[inline]
fn read_ticks() -> u64 {
    use std::sync::OnceLock;

    static EPOCH: OnceLock<minstant::Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(minstant::Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Spins until at least `ticks` ticks have elapsed since entry.
///
/// Never fails and always returns after the requested interval. The acquire
/// fence in the loop body forces a fresh read of whatever shared location the
/// caller is about to re-probe.
#[inline]
pub(crate) fn wait_ticks(ticks: u64) {
    let deadline = read_ticks().saturating_add(ticks);
    while read_ticks() < deadline {
        std::hint::spin_loop();
        fence(Ordering::Acquire);
    }
}
