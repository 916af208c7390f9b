//! Hardware backends for the diverter: a simulated plant for development
//! and, behind the `hardware` feature, Raspberry Pi GPIO/SPI implementations
//! of the frontend traits.

pub mod error;
pub mod mcp3004;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use divert_traits::{AnalogFrontend, Channel, LoadSwitch, ModeInput, Watchdog};

const TRIPLETS_PER_CYCLE: u32 = 20;
const ADC_MIDRAIL: i32 = 512;
const ADC_MAX: i32 = 1023;

/// Shape of the simulated site.
#[derive(Debug, Clone, Copy)]
pub struct WaveformConfig {
    /// Mains voltage amplitude in ADC counts.
    pub voltage_amp: f64,
    /// Grid current amplitude with the load off; positive reads as export.
    pub surplus_amp: f64,
    /// Current the dump load draws when switched on, in ADC counts.
    pub load_amp: f64,
    /// Standing DC error on all channels, in ADC counts.
    pub dc_bias: f64,
    /// White noise amplitude in ADC counts.
    pub noise_amp: f64,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            voltage_amp: 200.0,
            surplus_amp: 60.0,
            load_amp: 100.0,
            dc_bias: 0.0,
            noise_amp: 0.0,
        }
    }
}

struct PlantState {
    load_on: AtomicBool,
    transitions: AtomicU32,
}

/// Simulated analog frontend: an ideal mains waveform with in-phase current
/// channels, closed-loop with the simulated load switch. Switching the load
/// on draws `load_amp` through the divert CT and subtracts it from the grid
/// CT, so the controller sees its own effect the way a real site would.
pub struct SimulatedFrontend {
    cfg: WaveformConfig,
    plant: Arc<PlantState>,
    armed: Channel,
    tick: u32,
    rng: u32,
}

impl SimulatedFrontend {
    pub fn new(cfg: WaveformConfig) -> Self {
        Self {
            cfg,
            plant: Arc::new(PlantState {
                load_on: AtomicBool::new(false),
                transitions: AtomicU32::new(0),
            }),
            armed: Channel::Voltage,
            tick: 0,
            rng: 0x9e37_79b9,
        }
    }

    /// Load switch wired into the same plant.
    pub fn load_switch(&self) -> SimulatedLoadSwitch {
        SimulatedLoadSwitch {
            plant: Arc::clone(&self.plant),
        }
    }

    fn noise(&mut self) -> f64 {
        // xorshift32, mapped to [-noise_amp, +noise_amp]
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (f64::from(x) / f64::from(u32::MAX) * 2.0 - 1.0) * self.cfg.noise_amp
    }

    fn sample(&mut self, amp: f64) -> i32 {
        let phase = 2.0 * std::f64::consts::PI * f64::from(self.tick % TRIPLETS_PER_CYCLE)
            / f64::from(TRIPLETS_PER_CYCLE);
        let raw = f64::from(ADC_MIDRAIL) + amp * phase.sin() + self.cfg.dc_bias + self.noise();
        (raw.round() as i32).clamp(0, ADC_MAX)
    }
}

impl AnalogFrontend for SimulatedFrontend {
    fn start_conversion(
        &mut self,
        channel: Channel,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.armed = channel;
        Ok(())
    }

    fn read_conversion(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let load_on = self.plant.load_on.load(Ordering::Relaxed);
        let raw = match self.armed {
            Channel::Voltage => self.sample(self.cfg.voltage_amp),
            Channel::GridCurrent => {
                let amp = if load_on {
                    self.cfg.surplus_amp - self.cfg.load_amp
                } else {
                    self.cfg.surplus_amp
                };
                self.sample(amp)
            }
            Channel::DivertCurrent => {
                let amp = if load_on { self.cfg.load_amp } else { 0.0 };
                let raw = self.sample(amp);
                self.tick = self.tick.wrapping_add(1);
                raw
            }
        };
        Ok(raw)
    }
}

/// Simulated load switch; state is observable through the shared plant.
pub struct SimulatedLoadSwitch {
    plant: Arc<PlantState>,
}

impl SimulatedLoadSwitch {
    pub fn is_on(&self) -> bool {
        self.plant.load_on.load(Ordering::Relaxed)
    }

    pub fn transitions(&self) -> u32 {
        self.plant.transitions.load(Ordering::Relaxed)
    }
}

impl LoadSwitch for SimulatedLoadSwitch {
    fn set_on(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.plant.load_on.swap(on, Ordering::Relaxed) != on {
            self.plant.transitions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(on, "simulated load switched");
        }
        Ok(())
    }
}

/// Mode input pinned at construction.
pub struct SimulatedModeInput {
    anti_flicker: bool,
}

impl SimulatedModeInput {
    pub fn new(anti_flicker: bool) -> Self {
        Self { anti_flicker }
    }
}

impl ModeInput for SimulatedModeInput {
    fn anti_flicker_selected(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.anti_flicker)
    }
}

/// Watchdog that only records feeds; a development stand-in for the
/// hardware timer.
#[derive(Default)]
pub struct SimulatedWatchdog {
    feeds: u64,
}

impl SimulatedWatchdog {
    pub fn feeds(&self) -> u64 {
        self.feeds
    }
}

impl Watchdog for SimulatedWatchdog {
    fn feed(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.feeds += 1;
        tracing::trace!(feeds = self.feeds, "watchdog fed");
        Ok(())
    }
}

#[cfg(feature = "hardware")]
mod gpio {
    use super::error::HwError;
    use divert_traits::{AnalogFrontend, Channel, LoadSwitch, ModeInput};
    use rppal::gpio::{Gpio, InputPin, OutputPin};
    use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

    /// Triac/SSR trigger on a GPIO output.
    pub struct GpioLoadSwitch {
        pin: OutputPin,
    }

    impl GpioLoadSwitch {
        pub fn new(pin: u8) -> Result<Self, HwError> {
            let pin = Gpio::new()
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .get(pin)
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .into_output_low();
            Ok(Self { pin })
        }
    }

    impl LoadSwitch for GpioLoadSwitch {
        fn set_on(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if on {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
            Ok(())
        }
    }

    /// Anti-flicker mode jumper on a GPIO input (high = anti-flicker).
    pub struct GpioModeInput {
        pin: InputPin,
    }

    impl GpioModeInput {
        pub fn new(pin: u8) -> Result<Self, HwError> {
            let pin = Gpio::new()
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .get(pin)
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .into_input_pullup();
            Ok(Self { pin })
        }
    }

    impl ModeInput for GpioModeInput {
        fn anti_flicker_selected(
            &mut self,
        ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.pin.is_high())
        }
    }

    /// MCP3004 10-bit ADC over SPI. The conversion completes inside the SPI
    /// transfer, so a read immediately follows its arm.
    pub struct Mcp3004Frontend {
        spi: Spi,
        armed: Channel,
    }

    impl Mcp3004Frontend {
        pub fn new(clock_hz: u32) -> Result<Self, HwError> {
            let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, clock_hz, Mode::Mode0)
                .map_err(|e| HwError::Adc(e.to_string()))?;
            Ok(Self {
                spi,
                armed: Channel::Voltage,
            })
        }
    }

    impl AnalogFrontend for Mcp3004Frontend {
        fn start_conversion(
            &mut self,
            channel: Channel,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.armed = channel;
            Ok(())
        }

        fn read_conversion(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
            let tx = super::mcp3004::request(self.armed);
            let mut rx = [0u8; 3];
            self.spi
                .transfer(&mut rx, &tx)
                .map_err(|e| Box::new(HwError::Adc(e.to_string())) as _)?;
            Ok(super::mcp3004::decode(&rx))
        }
    }
}

#[cfg(feature = "hardware")]
mod wdt {
    use super::error::HwError;
    use divert_traits::Watchdog;
    use std::fs::{File, OpenOptions};
    use std::io::Write;

    /// The kernel watchdog device. Opening it starts the countdown; every
    /// feed rewinds it. Dropping writes the magic-close byte so an orderly
    /// shutdown does not reboot the box.
    pub struct LinuxWatchdog {
        file: File,
    }

    impl LinuxWatchdog {
        pub fn open(path: &str) -> Result<Self, HwError> {
            let file = OpenOptions::new().write(true).open(path)?;
            Ok(Self { file })
        }
    }

    impl Watchdog for LinuxWatchdog {
        fn feed(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.file.write_all(b".")?;
            Ok(())
        }
    }

    impl Drop for LinuxWatchdog {
        fn drop(&mut self) {
            let _ = self.file.write_all(b"V");
        }
    }
}

#[cfg(feature = "hardware")]
pub use gpio::{GpioLoadSwitch, GpioModeInput, Mcp3004Frontend};
#[cfg(feature = "hardware")]
pub use wdt::LinuxWatchdog;
