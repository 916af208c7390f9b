//! Zero-crossing detection and DC-offset tracking for the voltage channel.
//!
//! The voltage waveform rides on a mid-rail DC bias that drifts with
//! temperature and supply. A slow estimate of that bias is maintained in Q8
//! and every voltage sample is classified against it. A polarity change only
//! counts once the new polarity has outlived the debounce run, which keeps
//! crossing noise from fabricating cycle boundaries.

use crate::fixed_point::counts_to_q8;
use crate::util::ADC_MIDRAIL;

/// Instantaneous polarity of the voltage deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    #[inline]
    fn of(dev_q8: i32) -> Self {
        if dev_q8 >= 0 {
            Polarity::Positive
        } else {
            Polarity::Negative
        }
    }
}

/// A confirmed transition needs the new polarity to persist for more than
/// this many consecutive samples.
const POLARITY_DEBOUNCE: u8 = 2;
/// Allowed DC-offset excursion either side of nominal mid-rail, in counts.
const DC_OFFSET_GUARD_COUNTS: i32 = 100;
/// Right shift applied to the cycle's accumulated deviation before folding
/// it into the offset estimate; the low-pass that keeps the estimate slow.
const DC_FILTER_SHIFT: u32 = 6;

/// What one voltage sample told us.
#[derive(Debug, Clone, Copy)]
pub struct VoltageSample {
    /// Deviation from the tracked DC offset, Q8.
    pub deviation_q8: i32,
    /// A mains cycle just ended (confirmed negative-to-positive crossing).
    pub cycle_boundary: bool,
}

pub struct PolarityTracker {
    dc_offset_q8: i32,
    confirmed: Polarity,
    candidate: Polarity,
    candidate_run: u8,
    /// Accumulated deviation since the last fold, for the offset filter.
    cum_deviation_q8: i64,
}

impl Default for PolarityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PolarityTracker {
    pub fn new() -> Self {
        Self {
            dc_offset_q8: counts_to_q8(ADC_MIDRAIL),
            confirmed: Polarity::Positive,
            candidate: Polarity::Positive,
            candidate_run: 0,
            cum_deviation_q8: 0,
        }
    }

    /// Current DC offset estimate in Q8, for diagnostics.
    pub fn dc_offset_q8(&self) -> i32 {
        self.dc_offset_q8
    }

    pub fn confirmed_polarity(&self) -> Polarity {
        self.confirmed
    }

    /// Classify one raw voltage sample. At most one confirmed transition can
    /// result; a negative-to-positive one marks the cycle boundary here,
    /// a positive-to-negative one folds the deviation sum into the offset.
    pub fn update(&mut self, raw_voltage: i32) -> VoltageSample {
        let deviation_q8 = counts_to_q8(raw_voltage).saturating_sub(self.dc_offset_q8);
        self.cum_deviation_q8 += i64::from(deviation_q8);

        let polarity = Polarity::of(deviation_q8);
        let mut cycle_boundary = false;

        if polarity == self.confirmed {
            self.candidate_run = 0;
        } else {
            if polarity == self.candidate {
                self.candidate_run = self.candidate_run.saturating_add(1);
            } else {
                self.candidate = polarity;
                self.candidate_run = 1;
            }
            if self.candidate_run > POLARITY_DEBOUNCE {
                self.confirmed = self.candidate;
                self.candidate_run = 0;
                match self.confirmed {
                    Polarity::Positive => cycle_boundary = true,
                    Polarity::Negative => self.fold_dc_offset(),
                }
            }
        }

        VoltageSample {
            deviation_q8,
            cycle_boundary,
        }
    }

    /// Fold the accumulated deviation into the offset estimate, scaled down
    /// to act as a slow low-pass filter, then clamp to the guard band.
    fn fold_dc_offset(&mut self) {
        let correction = (self.cum_deviation_q8 >> DC_FILTER_SHIFT)
            .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        self.cum_deviation_q8 = 0;

        let min = counts_to_q8(ADC_MIDRAIL - DC_OFFSET_GUARD_COUNTS);
        let max = counts_to_q8(ADC_MIDRAIL + DC_OFFSET_GUARD_COUNTS);
        self.dc_offset_q8 = self.dc_offset_q8.saturating_add(correction).clamp(min, max);
    }
}
