//! Per-cycle control engine.
//!
//! The engine consumes sample triplets from the acquisition sequencer and
//! runs the whole pipeline: polarity tracking, power integration, the energy
//! bucket, the tank-full heuristic and the load arbiter. It owns no threads
//! and does no I/O; the runner feeds it ticks and applies its decisions to
//! the load switch.

use std::sync::Arc;

use crate::acquisition::SampleTriplet;
use crate::bucket::{EnergyBucket, ThresholdMode, Thresholds};
use crate::error::{BuildError, Result};
use crate::fixed_point::{counts_to_q8, joules_to_ieu, watts_to_ipu};
use crate::load::{LoadController, LoadState, Overrides};
use crate::power::PowerIntegrator;
use crate::shared::SharedControls;
use crate::tank::TankFullHeuristic;
use crate::util::ADC_MIDRAIL;
use crate::zero_cross::PolarityTracker;
use divert_config::Settings;

/// Mains cycles discarded after power-up while the DC offset filter settles.
pub const STARTUP_SETTLE_CYCLES: u32 = 100;

/// Triplets between a detected cycle boundary and the commit of the decision
/// made at that boundary.
const COMMIT_DELAY_TRIPLETS: u8 = 2;

/// All control thresholds quantized to integer units, so the sample path
/// never touches a float. Recomputed only when the settings revision moves
/// or the threshold mode flips.
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub thresholds: Thresholds,
    /// Grid power the controller steers toward, in grid-channel ipu.
    pub export_target_ipu: i64,
    /// Anti-creep floor for the divert channel, in divert-channel ipu.
    pub anti_creep_ipu: i64,
    /// Export level above which an unresponsive load reads as tank-full,
    /// in grid-channel ipu.
    pub export_threshold_ipu: i64,
    /// Divert-channel energy per watt-hour for the totalizer.
    pub ieu_per_wh: i64,
}

impl EngineLimits {
    pub fn derive(settings: &Settings, mode: ThresholdMode) -> Self {
        Self {
            thresholds: Thresholds::compute(settings, mode),
            export_target_ipu: watts_to_ipu(settings.export_target_w, settings.power_cal_grid),
            anti_creep_ipu: watts_to_ipu(settings.anti_creep_w, settings.power_cal_divert),
            export_threshold_ipu: watts_to_ipu(
                settings.export_divert_threshold_w,
                settings.power_cal_grid,
            ),
            ieu_per_wh: joules_to_ieu(3600.0, settings.power_cal_divert),
        }
    }
}

/// One engine instance drives one mains phase. All state lives here; the
/// only shared surface is [`SharedControls`].
pub struct Engine {
    shared: Arc<SharedControls>,
    tracker: PolarityTracker,
    power: PowerIntegrator,
    bucket: EnergyBucket,
    tank: TankFullHeuristic,
    load: LoadController,
    settings: Settings,
    limits: EngineLimits,
    mode: ThresholdMode,
    seen_rev: u64,
    settle_remaining: u32,
    /// Decision made at the last boundary, waiting out the commit delay.
    pending: Option<(LoadState, u8)>,
    /// Decision currently governing the load switch and the metering gate.
    active: LoadState,
}

fn check_settings(settings: &Settings) -> std::result::Result<(), BuildError> {
    if !(settings.power_cal_grid.is_finite() && settings.power_cal_grid > 0.0) {
        return Err(BuildError::InvalidConfig("power_cal_grid must be positive"));
    }
    if !(settings.power_cal_divert.is_finite() && settings.power_cal_divert > 0.0) {
        return Err(BuildError::InvalidConfig(
            "power_cal_divert must be positive",
        ));
    }
    if !(settings.bucket_range_j.is_finite() && settings.bucket_range_j > 16.0) {
        return Err(BuildError::InvalidConfig("bucket_range_j too small"));
    }
    if !(0.0..=0.45).contains(&settings.hysteresis_fraction) {
        return Err(BuildError::InvalidConfig(
            "hysteresis_fraction out of range",
        ));
    }
    Ok(())
}

/// Build an engine against the shared controls, validating the settings
/// snapshot it starts from.
pub fn build_engine(shared: Arc<SharedControls>) -> Result<Engine> {
    let settings = shared.settings_snapshot();
    let seen_rev = shared.settings_rev();
    check_settings(&settings)?;

    let mode = if shared.anti_flicker() {
        ThresholdMode::AntiFlicker
    } else {
        ThresholdMode::Normal
    };
    let limits = EngineLimits::derive(&settings, mode);
    let bucket = EnergyBucket::new(&limits.thresholds);

    tracing::info!(
        capacity_ieu = limits.thresholds.capacity_ieu,
        export_target_ipu = limits.export_target_ipu,
        ?mode,
        "engine built"
    );

    Ok(Engine {
        shared,
        tracker: PolarityTracker::new(),
        power: PowerIntegrator::new(),
        bucket,
        tank: TankFullHeuristic::new(),
        load: LoadController::new(),
        settings,
        limits,
        mode,
        seen_rev,
        settle_remaining: STARTUP_SETTLE_CYCLES,
        pending: None,
        active: LoadState::Off,
    })
}

impl Engine {
    /// Decision currently applied to the load switch.
    pub fn active(&self) -> LoadState {
        self.active
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    pub fn bucket_level_ieu(&self) -> i64 {
        self.bucket.level_ieu()
    }

    pub fn is_settling(&self) -> bool {
        self.settle_remaining > 0
    }

    /// Feed one sample triplet into the pipeline.
    ///
    /// Returns `Some(state)` exactly when a boundary decision commits, which
    /// happens after the third triplet of the new cycle; the caller drives
    /// the load switch from that. Between commits the previous state keeps
    /// governing both the switch and the divert-channel metering gate.
    pub fn ingest(&mut self, triplet: SampleTriplet, now_ms: u64) -> Option<LoadState> {
        let voltage = self.tracker.update(triplet.voltage);
        let grid_dev_q8 = counts_to_q8(triplet.grid_current) - counts_to_q8(ADC_MIDRAIL);
        let divert_dev_q8 = counts_to_q8(triplet.divert_current) - counts_to_q8(ADC_MIDRAIL);
        self.power.accumulate(
            voltage.deviation_q8,
            grid_dev_q8,
            divert_dev_q8,
            self.active.is_on(),
        );

        if voltage.cycle_boundary {
            let decision = self.end_of_cycle(now_ms);
            self.pending = Some((decision, COMMIT_DELAY_TRIPLETS));
            return None;
        }

        match self.pending {
            Some((decision, 0 | 1)) => {
                self.pending = None;
                self.active = decision;
                Some(decision)
            }
            Some((decision, n)) => {
                self.pending = Some((decision, n - 1));
                None
            }
            None => None,
        }
    }

    /// Close the cycle that just ended and decide the next one.
    fn end_of_cycle(&mut self, now_ms: u64) -> LoadState {
        let powers = self.power.finish_cycle();
        self.refresh_limits();

        let prev_on = self.active.is_on();

        if self.settle_remaining > 0 {
            // DC offset filter still converging; measurements are discarded
            // but the cycle counter must keep moving for liveness.
            self.settle_remaining -= 1;
            self.shared.publish_cycle(
                prev_on,
                self.tank.is_full(),
                powers.grid_ipu,
                powers.divert_ipu,
                self.load.diverted_wh(),
            );
            return LoadState::Off;
        }

        let proposal = self
            .bucket
            .update(powers.grid_ipu - self.limits.export_target_ipu, &self.limits.thresholds);
        let verdict = self.tank.evaluate(
            prev_on,
            powers.divert_ipu,
            powers.grid_ipu,
            self.limits.anti_creep_ipu,
            self.limits.export_threshold_ipu,
            now_ms,
        );
        let overrides = Overrides {
            force_on: self.shared.force_on(),
            enabled: self.shared.enabled(),
        };
        let decision = LoadController::decide(overrides, verdict, proposal);

        self.load.totalize(
            prev_on,
            powers.divert_ipu,
            self.limits.anti_creep_ipu,
            self.limits.ieu_per_wh,
        );

        self.shared.publish_cycle(
            prev_on,
            self.tank.is_full(),
            powers.grid_ipu,
            powers.divert_ipu,
            self.load.diverted_wh(),
        );
        if self.load.tick_digest() {
            self.shared.raise_digest();
        }

        decision
    }

    /// Pick up settings and mode changes at a cycle boundary only, so every
    /// threshold the cycle used was derived from one consistent snapshot.
    fn refresh_limits(&mut self) {
        let mut dirty = false;
        if let Some(settings) = self.shared.settings_if_changed(&mut self.seen_rev) {
            self.settings = settings;
            dirty = true;
        }
        let mode = if self.shared.anti_flicker() {
            ThresholdMode::AntiFlicker
        } else {
            ThresholdMode::Normal
        };
        if mode != self.mode {
            self.mode = mode;
            dirty = true;
        }
        if dirty {
            self.limits = EngineLimits::derive(&self.settings, self.mode);
            self.bucket.clamp_to(&self.limits.thresholds);
            tracing::debug!(
                lower_ieu = self.limits.thresholds.lower_ieu,
                upper_ieu = self.limits.thresholds.upper_ieu,
                mode = ?self.mode,
                "thresholds recomputed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::TRIPLETS_PER_CYCLE;

    fn shared_with(settings: Settings) -> Arc<SharedControls> {
        Arc::new(SharedControls::new(settings))
    }

    /// Synthesize the k-th triplet of an endless mains waveform with
    /// in-phase currents. Positive `grid_amp` means export.
    fn synth_triplet(k: u32, grid_amp: f64, divert_amp: f64) -> SampleTriplet {
        let phase = 2.0 * std::f64::consts::PI * f64::from(k % TRIPLETS_PER_CYCLE)
            / f64::from(TRIPLETS_PER_CYCLE);
        let s = phase.sin();
        SampleTriplet {
            voltage: ADC_MIDRAIL + (200.0 * s).round() as i32,
            grid_current: ADC_MIDRAIL + (grid_amp * s).round() as i32,
            divert_current: ADC_MIDRAIL + (divert_amp * s).round() as i32,
        }
    }

    /// Drive `cycles` whole mains cycles through the engine, returning the
    /// tick index reached.
    fn run_cycles(
        engine: &mut Engine,
        start_k: u32,
        cycles: u32,
        grid_amp: f64,
        divert_amp: f64,
    ) -> u32 {
        let mut k = start_k;
        for _ in 0..cycles * TRIPLETS_PER_CYCLE {
            // 3 ms per triplet at 50 Hz mains keeps wall time roughly honest.
            engine.ingest(synth_triplet(k, grid_amp, divert_amp), u64::from(k) * 3);
            k += 1;
        }
        k
    }

    #[test]
    fn build_rejects_bad_calibration() {
        let mut settings = Settings::default();
        settings.power_cal_grid = 0.0;
        assert!(build_engine(shared_with(settings)).is_err());
    }

    #[test]
    fn build_bounds_match_settings_validation() {
        // Whatever `Settings::validate` rejects, the engine must reject too,
        // even when the snapshot arrived without passing through the store.
        let mut settings = Settings::default();
        settings.bucket_range_j = 16.0;
        assert!(settings.validate().is_err());
        assert!(build_engine(shared_with(settings)).is_err());

        let mut settings = Settings::default();
        settings.hysteresis_fraction = 0.46;
        assert!(settings.validate().is_err());
        assert!(build_engine(shared_with(settings)).is_err());
    }

    #[test]
    fn stays_off_while_settling() {
        let shared = shared_with(Settings::default());
        let mut engine = build_engine(Arc::clone(&shared)).unwrap();

        // Strong export the whole time; the settle window must win anyway.
        run_cycles(&mut engine, 0, STARTUP_SETTLE_CYCLES, 120.0, 0.0);
        assert!(engine.is_settling() || engine.active() == LoadState::Off);
        assert!(!engine.active().is_on());
    }

    #[test]
    fn export_turns_load_on_after_settling() {
        let shared = shared_with(Settings::default());
        let mut engine = build_engine(Arc::clone(&shared)).unwrap();

        let k = run_cycles(&mut engine, 0, STARTUP_SETTLE_CYCLES + 2, 120.0, 0.0);
        run_cycles(&mut engine, k, 10, 120.0, 0.0);
        assert!(engine.active().is_on());
        assert!(shared.grid_power_ipu() > 0);
        assert!(shared.cycle_count() > u64::from(STARTUP_SETTLE_CYCLES));
    }

    #[test]
    fn import_drains_bucket_to_off() {
        let shared = shared_with(Settings::default());
        let mut engine = build_engine(Arc::clone(&shared)).unwrap();

        let k = run_cycles(&mut engine, 0, STARTUP_SETTLE_CYCLES + 2, 120.0, 100.0);
        let k = run_cycles(&mut engine, k, 10, 120.0, 100.0);
        assert!(engine.active().is_on());

        // Anti-phase grid current: the house is importing now.
        run_cycles(&mut engine, k, 60, -120.0, 0.0);
        assert!(!engine.active().is_on());
        assert!(shared.grid_power_ipu() < 0);
    }

    #[test]
    fn decision_commits_on_third_triplet_of_cycle() {
        let shared = shared_with(Settings::default());
        let mut engine = build_engine(Arc::clone(&shared)).unwrap();

        let mut commits = Vec::new();
        for k in 0..(STARTUP_SETTLE_CYCLES + 5) * TRIPLETS_PER_CYCLE {
            if engine
                .ingest(synth_triplet(k, 120.0, 0.0), u64::from(k) * 3)
                .is_some()
            {
                commits.push(k % TRIPLETS_PER_CYCLE);
            }
        }
        assert!(!commits.is_empty());
        // Boundaries land on the first triplet of a cycle; commits trail by
        // the fixed delay.
        let offset = commits[0];
        assert!(commits.iter().all(|&c| c == offset));
    }

    #[test]
    fn disable_forces_load_off() {
        let shared = shared_with(Settings::default());
        let mut engine = build_engine(Arc::clone(&shared)).unwrap();

        let k = run_cycles(&mut engine, 0, STARTUP_SETTLE_CYCLES + 12, 120.0, 100.0);
        assert!(engine.active().is_on());

        shared.set_enabled(false);
        run_cycles(&mut engine, k, 3, 120.0, 100.0);
        assert!(!engine.active().is_on());
    }

    #[test]
    fn settings_change_is_picked_up_at_boundary() {
        let shared = shared_with(Settings::default());
        let mut engine = build_engine(Arc::clone(&shared)).unwrap();
        let before = engine.limits().export_target_ipu;

        let mut settings = shared.settings_snapshot();
        settings.export_target_w = 100.0;
        shared.update_settings(settings);

        run_cycles(&mut engine, 0, 2, 120.0, 0.0);
        assert!(engine.limits().export_target_ipu > before);
    }

    #[test]
    fn anti_flicker_widens_the_band() {
        let shared = shared_with(Settings::default());
        let mut engine = build_engine(Arc::clone(&shared)).unwrap();
        let normal = engine.limits().thresholds;
        assert_eq!(normal.lower_ieu, normal.upper_ieu);

        shared.set_anti_flicker(true);
        run_cycles(&mut engine, 0, 2, 120.0, 0.0);
        let banded = engine.limits().thresholds;
        assert!(banded.lower_ieu < banded.upper_ieu);
        assert_eq!(banded.capacity_ieu, normal.capacity_ieu);
    }
}
