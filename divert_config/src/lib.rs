#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Persisted settings for the diverter.
//!
//! - `Settings` is (de)serialized as TOML and validated before use.
//! - The file carries a schema marker; a missing or wrong marker means the
//!   store is invalid and factory defaults are substituted and re-persisted.
//!   Invalid settings are never a fatal condition.
//! - `save` writes atomically (temp file + rename) so a power loss mid-write
//!   leaves either the old or the new file, never a torn one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Schema marker expected in a valid settings file.
pub const SCHEMA_MARKER: &str = "divert-settings-v1";

/// Calibration and policy parameters read by the control pipeline.
///
/// Power calibration factors are watts per internal power unit; the core
/// converts every watt/joule figure into internal units when thresholds are
/// recomputed, so these floats never enter the per-sample path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Validity marker; must equal [`SCHEMA_MARKER`].
    pub schema: String,
    /// Watts per internal power unit, grid channel.
    pub power_cal_grid: f32,
    /// Watts per internal power unit, diverted-load channel.
    pub power_cal_divert: f32,
    /// Energy bucket working range in joules.
    pub bucket_range_j: f32,
    /// Target net export in watts (0 = divert all surplus).
    pub export_target_w: f32,
    /// Power below this is treated as measurement noise, in watts.
    pub anti_creep_w: f32,
    /// Minimum export while diverting for the tank-full test, in watts.
    pub export_divert_threshold_w: f32,
    /// Half-width of the anti-flicker dead band as a fraction of capacity.
    pub hysteresis_fraction: f32,
    /// Emit labeled telemetry digests instead of the compact positional form.
    pub verbose_telemetry: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema: SCHEMA_MARKER.to_string(),
            power_cal_grid: 0.05,
            power_cal_divert: 0.05,
            bucket_range_j: 360.0,
            export_target_w: 0.0,
            anti_creep_w: 10.0,
            export_divert_threshold_w: 50.0,
            hysteresis_fraction: 0.10,
            verbose_telemetry: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.schema != SCHEMA_MARKER {
            eyre::bail!(
                "settings schema marker mismatch: expected {SCHEMA_MARKER:?}, got {:?}",
                self.schema
            );
        }
        if !(self.power_cal_grid.is_finite() && self.power_cal_grid > 0.0) {
            eyre::bail!("power_cal_grid must be finite and > 0");
        }
        if !(self.power_cal_divert.is_finite() && self.power_cal_divert > 0.0) {
            eyre::bail!("power_cal_divert must be finite and > 0");
        }
        if !(self.bucket_range_j.is_finite() && self.bucket_range_j > 16.0) {
            eyre::bail!("bucket_range_j must be finite and > 16");
        }
        if !(self.export_target_w.is_finite() && self.export_target_w.abs() <= 1000.0) {
            eyre::bail!("export_target_w must be finite and within +/-1000");
        }
        if !(self.anti_creep_w.is_finite() && self.anti_creep_w >= 0.0) {
            eyre::bail!("anti_creep_w must be finite and >= 0");
        }
        if !(self.export_divert_threshold_w.is_finite() && self.export_divert_threshold_w >= 0.0) {
            eyre::bail!("export_divert_threshold_w must be finite and >= 0");
        }
        if !(self.hysteresis_fraction.is_finite()
            && (0.0..=0.45).contains(&self.hysteresis_fraction))
        {
            eyre::bail!("hysteresis_fraction must be in [0.0, 0.45]");
        }
        Ok(())
    }

    /// Read a settings field by console name.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "power_cal_grid" => Some(self.power_cal_grid.to_string()),
            "power_cal_divert" => Some(self.power_cal_divert.to_string()),
            "bucket_range_j" => Some(self.bucket_range_j.to_string()),
            "export_target_w" => Some(self.export_target_w.to_string()),
            "anti_creep_w" => Some(self.anti_creep_w.to_string()),
            "export_divert_threshold_w" => Some(self.export_divert_threshold_w.to_string()),
            "hysteresis_fraction" => Some(self.hysteresis_fraction.to_string()),
            "verbose_telemetry" => Some(self.verbose_telemetry.to_string()),
            _ => None,
        }
    }

    /// Set a settings field by console name. The mutation is validated as a
    /// whole; on failure the previous value is restored and an error returned.
    pub fn set(&mut self, key: &str, value: &str) -> eyre::Result<()> {
        let previous = self.clone();
        let parse_f32 = |v: &str| -> eyre::Result<f32> {
            v.parse::<f32>()
                .map_err(|e| eyre::eyre!("invalid number {v:?}: {e}"))
        };
        match key {
            "power_cal_grid" => self.power_cal_grid = parse_f32(value)?,
            "power_cal_divert" => self.power_cal_divert = parse_f32(value)?,
            "bucket_range_j" => self.bucket_range_j = parse_f32(value)?,
            "export_target_w" => self.export_target_w = parse_f32(value)?,
            "anti_creep_w" => self.anti_creep_w = parse_f32(value)?,
            "export_divert_threshold_w" => self.export_divert_threshold_w = parse_f32(value)?,
            "hysteresis_fraction" => self.hysteresis_fraction = parse_f32(value)?,
            "verbose_telemetry" => {
                self.verbose_telemetry = value
                    .parse::<bool>()
                    .map_err(|e| eyre::eyre!("invalid bool {value:?}: {e}"))?;
            }
            other => eyre::bail!("unknown setting {other:?}"),
        }
        if let Err(e) = self.validate() {
            *self = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Names accepted by `get`/`set`, in canonical order.
    pub fn keys() -> &'static [&'static str] {
        &[
            "power_cal_grid",
            "power_cal_divert",
            "bucket_range_j",
            "export_target_w",
            "anti_creep_w",
            "export_divert_threshold_w",
            "hysteresis_fraction",
            "verbose_telemetry",
        ]
    }
}

pub fn load_toml(s: &str) -> eyre::Result<Settings> {
    let settings: Settings = toml::from_str(s).map_err(|e| eyre::eyre!("parse settings: {e}"))?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `path`. Any failure (absent file, parse error, bad
/// schema marker, out-of-range value) substitutes factory defaults and
/// persists them, so the caller always gets a valid configuration.
pub fn load_or_default(path: &Path) -> Settings {
    if let Ok(text) = fs::read_to_string(path)
        && let Ok(settings) = load_toml(&text)
    {
        return settings;
    }
    let defaults = Settings::default();
    // Best effort; running on defaults without a store is still valid.
    let _ = save(path, &defaults);
    defaults
}

/// Persist settings atomically: write to a sibling temp file, fsync, rename.
pub fn save(path: &Path, settings: &Settings) -> eyre::Result<()> {
    let text =
        toml::to_string_pretty(settings).map_err(|e| eyre::eyre!("serialize settings: {e}"))?;
    write_atomic(path, text.as_bytes()).map_err(|e| eyre::eyre!("write {path:?}: {e}"))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}
