//! Bounded energy-bucket integrator and its mode-dependent thresholds.
//!
//! The bucket holds the recent net energy surplus in ieu, saturating at
//! [0, capacity]. Each confirmed cycle adds `grid power - export target`; the
//! level against the thresholds produces the raw on/off proposal that the
//! load state machine may override.

use crate::fixed_point::joules_to_ieu;
use crate::load::LoadState;
use divert_config::Settings;

/// Which threshold shape is active, from the external mode input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Lower and upper thresholds coincide at the baseline.
    Normal,
    /// Symmetric dead band around the baseline suppresses rapid toggling.
    AntiFlicker,
}

/// Fixed joule offset subtracted from the working range before the baseline
/// fraction is taken. Carried over verbatim from the field-proven tuning.
/// TODO: revisit this 8 J offset against fresh calibration data.
const BASELINE_RANGE_OFFSET_J: f32 = 8.0;

/// Bucket capacity and switching thresholds in ieu. Recomputed only when the
/// configuration or the mode input changes, never per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub capacity_ieu: i64,
    pub lower_ieu: i64,
    pub upper_ieu: i64,
}

impl Thresholds {
    /// Derive capacity and thresholds from the validated settings.
    ///
    /// Invariant: `0 <= lower <= upper <= capacity` in both modes, and the
    /// anti-flicker band is symmetric around the normal-mode baseline
    /// (up to the clamp at the bucket ends).
    pub fn compute(settings: &Settings, mode: ThresholdMode) -> Self {
        let cal = settings.power_cal_grid;
        let capacity_ieu = joules_to_ieu(settings.bucket_range_j, cal).max(0);
        let baseline_j = (settings.bucket_range_j - BASELINE_RANGE_OFFSET_J) / 2.0;
        let baseline_ieu = joules_to_ieu(baseline_j, cal).clamp(0, capacity_ieu);

        let (lower_ieu, upper_ieu) = match mode {
            ThresholdMode::Normal => (baseline_ieu, baseline_ieu),
            ThresholdMode::AntiFlicker => {
                let half_band =
                    joules_to_ieu(settings.bucket_range_j * settings.hysteresis_fraction, cal)
                        .max(0);
                (
                    (baseline_ieu - half_band).clamp(0, capacity_ieu),
                    (baseline_ieu + half_band).clamp(0, capacity_ieu),
                )
            }
        };

        Self {
            capacity_ieu,
            lower_ieu,
            upper_ieu,
        }
    }
}

#[derive(Debug)]
pub struct EnergyBucket {
    level_ieu: i64,
    proposal: LoadState,
}

impl EnergyBucket {
    /// Start half full so neither decision is latched before real data.
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            level_ieu: thresholds.capacity_ieu / 2,
            proposal: LoadState::Off,
        }
    }

    pub fn level_ieu(&self) -> i64 {
        self.level_ieu
    }

    pub fn proposal(&self) -> LoadState {
        self.proposal
    }

    /// Keep the level valid after a capacity change.
    pub fn clamp_to(&mut self, thresholds: &Thresholds) {
        self.level_ieu = self.level_ieu.clamp(0, thresholds.capacity_ieu);
    }

    /// Integrate one cycle's net energy and evaluate the thresholds.
    /// Inside the dead band the previous proposal persists.
    pub fn update(&mut self, delta_ieu: i64, thresholds: &Thresholds) -> LoadState {
        self.level_ieu = self
            .level_ieu
            .saturating_add(delta_ieu)
            .clamp(0, thresholds.capacity_ieu);

        if self.level_ieu > thresholds.upper_ieu {
            self.proposal = LoadState::On;
        } else if self.level_ieu < thresholds.lower_ieu {
            self.proposal = LoadState::Off;
        }
        self.proposal
    }
}
