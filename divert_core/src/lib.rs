#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core power-diversion logic (hardware-agnostic).
//!
//! This crate decides, once per AC mains cycle, whether a resistive dump load
//! is switched fully on or off so that net grid flow tracks a configured
//! export target. All hardware interactions go through the `divert_traits`
//! seams (`AnalogFrontend`, `LoadSwitch`, `ModeInput`, `Watchdog`).
//!
//! ## Architecture
//!
//! - **Acquisition**: 3-channel round-robin sequencer (`acquisition`)
//! - **Phase**: zero-crossing detection and DC-offset tracking (`zero_cross`)
//! - **Metering**: per-cycle real-power accumulation (`power`)
//! - **Control**: bounded energy bucket with mode-dependent hysteresis
//!   (`bucket`), tank-full inference (`tank`), load state machine and
//!   energy totalizing (`load`), composed by `engine`
//! - **Exchange**: cross-priority shared state (`shared`), digest (`status`)
//!
//! ## Fixed-Point Arithmetic
//!
//! The sample path is integer-only. Raw ADC deviations are held in Q8
//! (`counts << 8`); per-sample power products are `(v_q8 * i_q8) >> 12`,
//! giving "internal power units" (ipu). Energies are ipu summed over whole
//! cycles ("internal energy units", ieu; 1 ieu = power_cal * 0.02 J). The
//! floating-point calibration/policy values from `divert_config` are
//! quantized into these units only when thresholds are recomputed.

pub mod acquisition;
pub mod bucket;
pub mod engine;
pub mod error;
pub mod fixed_point;
pub mod hw_error;
pub mod load;
pub mod mocks;
pub mod power;
pub mod runner;
pub mod shared;
pub mod status;
pub mod tank;
pub mod util;
pub mod zero_cross;

pub use acquisition::{AcquisitionSequencer, SampleTriplet};
pub use bucket::{EnergyBucket, ThresholdMode, Thresholds};
pub use engine::{Engine, EngineLimits, build_engine};
pub use error::{BuildError, DivertError, Result};
pub use load::{LoadController, LoadState};
pub use shared::SharedControls;
pub use status::StatusDigest;
pub use tank::{TankFullHeuristic, TankVerdict};
pub use zero_cross::{Polarity, PolarityTracker};
