//! Timer-tick driven channel sequencing.
//!
//! One conversion is in flight at any time. Each tick reads the previously
//! armed channel, stores it, and immediately re-arms the next channel so the
//! converter runs continuously. After the divert-current slot fills, the
//! completed triplet is handed back for synchronous processing; there is no
//! queue, so processing must finish inside one tick period.

use crate::error::Result;
use crate::hw_error::map_hw_error;
use divert_traits::{AnalogFrontend, Channel};

/// One raw reading per channel, collected over three consecutive ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTriplet {
    pub voltage: i32,
    pub grid_current: i32,
    pub divert_current: i32,
}

pub struct AcquisitionSequencer {
    /// Channel whose conversion is currently in flight.
    in_flight: Channel,
    voltage: i32,
    grid_current: i32,
}

impl AcquisitionSequencer {
    /// Arm the first (voltage) conversion and return the sequencer.
    pub fn start<F: AnalogFrontend>(frontend: &mut F) -> Result<Self> {
        frontend
            .start_conversion(Channel::Voltage)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
        Ok(Self {
            in_flight: Channel::Voltage,
            voltage: 0,
            grid_current: 0,
        })
    }

    /// Service one timer tick: collect the in-flight conversion, re-arm the
    /// next channel, and return the triplet when the third slot has filled.
    pub fn on_tick<F: AnalogFrontend>(&mut self, frontend: &mut F) -> Result<Option<SampleTriplet>> {
        let raw = frontend
            .read_conversion()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;
        let completed = self.in_flight;
        self.in_flight = completed.next();
        frontend
            .start_conversion(self.in_flight)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))?;

        match completed {
            Channel::Voltage => {
                self.voltage = raw;
                Ok(None)
            }
            Channel::GridCurrent => {
                self.grid_current = raw;
                Ok(None)
            }
            Channel::DivertCurrent => Ok(Some(SampleTriplet {
                voltage: self.voltage,
                grid_current: self.grid_current,
                divert_current: raw,
            })),
        }
    }
}
