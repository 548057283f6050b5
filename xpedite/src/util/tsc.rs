//! Time-stamp counter access and frequency estimation
//!
//! Samples carry raw TSC values; offline analysis converts them to wall
//! time using the frequency recorded in the sample file header. On targets
//! without a TSC the monotonic clock stands in, with an effective
//! frequency of 1 GHz (one tick per nanosecond).

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Window used to calibrate the TSC against the OS monotonic clock.
const CALIBRATION_WINDOW: Duration = Duration::from_millis(20);

/// Read the cycle counter.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn rdtsc() -> u64 {
    // SAFETY: RDTSC has no preconditions; it is available on every x86_64.
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Monotonic nanosecond counter on targets without a TSC.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn rdtsc() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Estimate the TSC frequency in Hz.
///
/// Calibrated once per process by spinning over a short wall-clock window;
/// subsequent calls return the cached value.
pub fn estimate_tsc_hz() -> u64 {
    static TSC_HZ: OnceLock<u64> = OnceLock::new();
    *TSC_HZ.get_or_init(calibrate)
}

#[cfg(target_arch = "x86_64")]
fn calibrate() -> u64 {
    let wall_start = Instant::now();
    let tsc_start = rdtsc();
    while wall_start.elapsed() < CALIBRATION_WINDOW {
        std::hint::spin_loop();
    }
    let ticks = rdtsc().wrapping_sub(tsc_start);
    let elapsed = wall_start.elapsed();
    let hz = (ticks as u128 * 1_000_000_000 / elapsed.as_nanos().max(1)) as u64;
    log::debug!("calibrated tsc frequency: {hz} Hz over {elapsed:?}");
    hz
}

#[cfg(not(target_arch = "x86_64"))]
fn calibrate() -> u64 {
    // rdtsc() counts nanoseconds on this target
    1_000_000_000
}
