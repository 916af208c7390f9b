//! Per-cycle real-power accumulation for the grid and diverted channels.
//!
//! Every sample triplet contributes one `v * i` product per channel; the
//! diverted channel only accumulates while the load is actually energized,
//! so its figure reflects delivered energy rather than leakage picked up by
//! the current transformer while the load is off.

use crate::fixed_point::power_sample_ipu;
use crate::util::div_round_nearest_i64;

/// Mean real power per channel over one mains cycle, in ipu.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CyclePowers {
    pub grid_ipu: i64,
    pub divert_ipu: i64,
    pub samples: u32,
}

#[derive(Debug, Default)]
pub struct PowerIntegrator {
    grid_sum: i64,
    divert_sum: i64,
    samples: u32,
}

impl PowerIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one triplet's products. `load_on` is the decision currently
    /// governing the output, which gates the diverted channel.
    pub fn accumulate(
        &mut self,
        v_dev_q8: i32,
        grid_dev_q8: i32,
        divert_dev_q8: i32,
        load_on: bool,
    ) {
        self.grid_sum += power_sample_ipu(v_dev_q8, grid_dev_q8);
        if load_on {
            self.divert_sum += power_sample_ipu(v_dev_q8, divert_dev_q8);
        }
        self.samples = self.samples.saturating_add(1);
    }

    /// Close the cycle: return per-channel means and reset for the next one.
    /// A cycle with zero contributing samples reads as zero power.
    pub fn finish_cycle(&mut self) -> CyclePowers {
        let samples = self.samples;
        let powers = if samples == 0 {
            CyclePowers::default()
        } else {
            CyclePowers {
                grid_ipu: div_round_nearest_i64(self.grid_sum, i64::from(samples)),
                divert_ipu: div_round_nearest_i64(self.divert_sum, i64::from(samples)),
                samples,
            }
        };
        self.grid_sum = 0;
        self.divert_sum = 0;
        self.samples = 0;
        powers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::counts_to_q8;

    #[test]
    fn zero_samples_reads_as_zero_power() {
        let mut p = PowerIntegrator::new();
        assert_eq!(p.finish_cycle(), CyclePowers::default());
    }

    #[test]
    fn in_phase_waveform_gives_positive_mean() {
        let mut p = PowerIntegrator::new();
        for n in 0..20 {
            let theta = (n as f64) * std::f64::consts::TAU / 20.0;
            let v = counts_to_q8((300.0 * theta.sin()) as i32);
            let i = counts_to_q8((30.0 * theta.sin()) as i32);
            p.accumulate(v, i, 0, false);
        }
        let powers = p.finish_cycle();
        assert!(powers.grid_ipu > 0);
        assert_eq!(powers.divert_ipu, 0);
        assert_eq!(powers.samples, 20);
    }

    #[test]
    fn anti_phase_waveform_gives_negative_mean() {
        let mut p = PowerIntegrator::new();
        for n in 0..20 {
            let theta = (n as f64) * std::f64::consts::TAU / 20.0;
            let v = counts_to_q8((300.0 * theta.sin()) as i32);
            let i = counts_to_q8((-30.0 * theta.sin()) as i32);
            p.accumulate(v, i, 0, false);
        }
        assert!(p.finish_cycle().grid_ipu < 0);
    }

    #[test]
    fn divert_channel_only_counts_while_load_on() {
        let mut on = PowerIntegrator::new();
        let mut off = PowerIntegrator::new();
        for n in 0..20 {
            let theta = (n as f64) * std::f64::consts::TAU / 20.0;
            let v = counts_to_q8((300.0 * theta.sin()) as i32);
            let i = counts_to_q8((40.0 * theta.sin()) as i32);
            on.accumulate(v, 0, i, true);
            off.accumulate(v, 0, i, false);
        }
        assert!(on.finish_cycle().divert_ipu > 0);
        assert_eq!(off.finish_cycle().divert_ipu, 0);
    }

    #[test]
    fn finish_resets_the_accumulators() {
        let mut p = PowerIntegrator::new();
        p.accumulate(counts_to_q8(100), counts_to_q8(100), counts_to_q8(100), true);
        let first = p.finish_cycle();
        assert!(first.grid_ipu > 0);
        assert_eq!(p.finish_cycle(), CyclePowers::default());
    }
}
