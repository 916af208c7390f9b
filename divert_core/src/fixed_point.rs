//! Fixed-point conversion helpers.
//!
//! The per-sample path works exclusively in integers:
//! - ADC deviations are Q8 (`counts << 8`);
//! - a power sample is `(v_q8 * i_q8) >> PRODUCT_SHIFT`, an "internal power
//!   unit" (ipu) worth `power_cal` watts;
//! - an "internal energy unit" (ieu) is one ipu sustained for one mains
//!   cycle, worth `power_cal / MAINS_HZ` joules.
//!
//! Calibration and policy floats are quantized here, once, when thresholds
//! are recomputed; they never reach the sample path.

use crate::util::MAINS_HZ;

/// Left shift from raw ADC counts into Q8.
pub const Q8_SHIFT: u32 = 8;
/// Right shift applied to each `v_q8 * i_q8` product.
pub const PRODUCT_SHIFT: u32 = 12;

/// Raw ADC counts into Q8.
#[inline]
pub fn counts_to_q8(counts: i32) -> i32 {
    counts << Q8_SHIFT
}

/// One power-product sample in ipu. Q8 deviations are at most ~18 bits, so
/// the 64-bit product cannot overflow and the shifted result fits easily.
#[inline]
pub fn power_sample_ipu(v_dev_q8: i32, i_dev_q8: i32) -> i64 {
    ((v_dev_q8 as i64) * (i_dev_q8 as i64)) >> PRODUCT_SHIFT
}

/// Quantize a wattage to ipu given the channel calibration (watts per ipu).
/// Non-finite watts or a non-positive calibration map to 0.
#[inline]
pub fn watts_to_ipu(watts: f32, power_cal: f32) -> i64 {
    if !watts.is_finite() || !power_cal.is_finite() || power_cal <= 0.0 {
        return 0;
    }
    let scaled = (f64::from(watts) / f64::from(power_cal)).round();
    clamp_f64_to_i64(scaled)
}

/// Quantize joules to ieu given the channel calibration (watts per ipu).
/// 1 ieu = power_cal / MAINS_HZ joules, so ieu = J * MAINS_HZ / power_cal.
#[inline]
pub fn joules_to_ieu(joules: f32, power_cal: f32) -> i64 {
    if !joules.is_finite() || !power_cal.is_finite() || power_cal <= 0.0 {
        return 0;
    }
    let scaled = (f64::from(joules) * f64::from(MAINS_HZ) / f64::from(power_cal)).round();
    clamp_f64_to_i64(scaled)
}

/// Convert an ipu reading back to watts for display and telemetry only.
#[inline]
pub fn ipu_to_watts(ipu: i64, power_cal: f32) -> f32 {
    (ipu as f64 * f64::from(power_cal)) as f32
}

#[inline]
fn clamp_f64_to_i64(x: f64) -> i64 {
    if x >= i64::MAX as f64 {
        i64::MAX
    } else if x <= i64::MIN as f64 {
        i64::MIN
    } else {
        x as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_scale_into_q8() {
        assert_eq!(counts_to_q8(1), 256);
        assert_eq!(counts_to_q8(-100), -25_600);
    }

    #[test]
    fn power_sample_matches_manual_shift() {
        // 100 counts of voltage deviation times 50 counts of current.
        let v = counts_to_q8(100);
        let i = counts_to_q8(50);
        assert_eq!(power_sample_ipu(v, i), ((v as i64) * (i as i64)) >> 12);
        assert_eq!(power_sample_ipu(v, -i), -power_sample_ipu(v, i));
    }

    #[test]
    fn watts_quantization_rounds_to_nearest() {
        assert_eq!(watts_to_ipu(50.0, 0.05), 1_000);
        assert_eq!(watts_to_ipu(0.026, 0.05), 1);
        assert_eq!(watts_to_ipu(-50.0, 0.05), -1_000);
    }

    #[test]
    fn degenerate_calibration_maps_to_zero() {
        assert_eq!(watts_to_ipu(100.0, 0.0), 0);
        assert_eq!(watts_to_ipu(f32::NAN, 0.05), 0);
        assert_eq!(joules_to_ieu(100.0, -1.0), 0);
        assert_eq!(joules_to_ieu(f32::INFINITY, 0.05), 0);
    }

    #[test]
    fn energy_quantization_uses_cycle_rate() {
        // 360 J at 0.05 W/ipu: 360 * 50 / 0.05 = 360_000 ieu.
        assert_eq!(joules_to_ieu(360.0, 0.05), 360_000);
        // One watt-hour in divert units at the default calibration.
        assert_eq!(joules_to_ieu(3600.0, 0.05), 3_600_000);
    }

    #[test]
    fn ipu_to_watts_is_the_inverse_scale() {
        let w = ipu_to_watts(1_000, 0.05);
        assert!((w - 50.0).abs() < 1e-4);
    }
}
