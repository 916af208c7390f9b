//! Timing and ADC constants shared across the pipeline.

/// Mains frequency the cycle logic is built around.
pub const MAINS_HZ: u32 = 50;
/// Acquisition timer rate; three channels round-robin.
pub const TICK_HZ: u32 = 3_000;
/// Complete sample triplets per second.
pub const TRIPLETS_PER_SEC: u32 = TICK_HZ / 3;
/// Nominal triplets contributing to one 20 ms mains cycle.
pub const TRIPLETS_PER_CYCLE: u32 = TRIPLETS_PER_SEC / MAINS_HZ;

/// Full-scale ADC code (10-bit converter).
pub const ADC_MAX: i32 = 1023;
/// Nominal mid-rail code the AC waveforms are biased around.
pub const ADC_MIDRAIL: i32 = 512;

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Acquisition tick period in microseconds.
#[inline]
pub fn tick_period_us() -> u64 {
    MICROS_PER_SEC / u64::from(TICK_HZ)
}

/// Rounded-to-nearest signed division, ties away from zero.
/// `den` must be non-zero.
#[inline]
pub fn div_round_nearest_i64(num: i64, den: i64) -> i64 {
    debug_assert!(den != 0, "div_round_nearest_i64: zero divisor");
    let half = den.abs() / 2;
    if (num >= 0) == (den > 0) {
        (num + half) / den
    } else {
        (num - half) / den
    }
}
