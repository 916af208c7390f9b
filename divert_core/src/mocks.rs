//! Test and helper mocks for divert_core

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use divert_traits::{AnalogFrontend, Channel, LoadSwitch, Watchdog};

use crate::util::{ADC_MIDRAIL, TRIPLETS_PER_CYCLE};

/// Frontend that plays back an ideal mains waveform with in-phase current
/// channels, advancing one triplet slot per conversion cycle.
///
/// Amplitudes are in ADC counts around the mid-rail; a positive grid
/// amplitude reads as export. Amplitudes may be changed mid-run.
pub struct WaveformFrontend {
    armed: Channel,
    tick: u32,
    pub voltage_amp: f64,
    pub grid_amp: f64,
    pub divert_amp: f64,
}

impl WaveformFrontend {
    pub fn new(voltage_amp: f64, grid_amp: f64, divert_amp: f64) -> Self {
        Self {
            armed: Channel::Voltage,
            tick: 0,
            voltage_amp,
            grid_amp,
            divert_amp,
        }
    }

    fn sample(&self, amp: f64) -> i32 {
        let phase = 2.0 * std::f64::consts::PI * f64::from(self.tick % TRIPLETS_PER_CYCLE)
            / f64::from(TRIPLETS_PER_CYCLE);
        ADC_MIDRAIL + (amp * phase.sin()).round() as i32
    }
}

impl AnalogFrontend for WaveformFrontend {
    fn start_conversion(
        &mut self,
        channel: Channel,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.armed = channel;
        Ok(())
    }

    fn read_conversion(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let raw = match self.armed {
            Channel::Voltage => self.sample(self.voltage_amp),
            Channel::GridCurrent => self.sample(self.grid_amp),
            Channel::DivertCurrent => {
                let raw = self.sample(self.divert_amp);
                // The divert slot closes the triplet; the next one starts a
                // new point on the waveform.
                self.tick = self.tick.wrapping_add(1);
                raw
            }
        };
        Ok(raw)
    }
}

/// Load switch that mirrors its commanded state into shared atomics so a
/// test can observe it from outside the control thread.
#[derive(Clone, Default)]
pub struct RecordingLoadSwitch {
    pub on: Arc<AtomicBool>,
    pub transitions: Arc<AtomicU32>,
}

impl RecordingLoadSwitch {
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }
}

impl LoadSwitch for RecordingLoadSwitch {
    fn set_on(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.on.swap(on, Ordering::Relaxed) != on {
            self.transitions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Watchdog that only counts its feeds.
#[derive(Clone, Default)]
pub struct CountingWatchdog {
    pub feeds: Arc<AtomicU32>,
}

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.feeds.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
