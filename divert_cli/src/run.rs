//! Run-mode assembly: backend selection, thread wiring, console, shutdown.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use divert_core::runner::{AcquisitionRunner, supervise};
use divert_core::{DivertError, SharedControls};
use divert_traits::clock::MonotonicClock;
use divert_traits::{AnalogFrontend, LoadSwitch, ModeInput, Watchdog};
use eyre::Result;

use crate::cli::RtLock;
use crate::rt::setup_rt_once;

pub struct RunOpts {
    pub duration: Option<u64>,
    pub anti_flicker: bool,
    pub surplus_amp: f64,
    pub load_amp: f64,
    pub dc_bias: f64,
    pub noise_amp: f64,
    pub rt: bool,
    pub rt_prio: Option<i32>,
    pub rt_lock: Option<RtLock>,
    pub rt_cpu: Option<usize>,
}

#[cfg(feature = "hardware")]
mod pins {
    /// Triac trigger output (BCM numbering).
    pub const LOAD_SWITCH: u8 = 17;
    /// Anti-flicker mode jumper input.
    pub const MODE_SELECT: u8 = 27;
    /// MCP3004 SPI clock; the 10-bit conversion completes within the frame.
    pub const ADC_CLOCK_HZ: u32 = 1_350_000;
}

pub fn run(config_path: &Path, opts: RunOpts) -> Result<()> {
    setup_rt_once(
        opts.rt,
        opts.rt_prio,
        opts.rt_lock.unwrap_or(RtLock::os_default()),
        opts.rt_cpu,
    );

    let settings = divert_config::load_or_default(config_path);
    let shared = Arc::new(SharedControls::new(settings));

    #[cfg(feature = "hardware")]
    {
        let frontend = divert_hardware::Mcp3004Frontend::new(pins::ADC_CLOCK_HZ)
            .map_err(|e| DivertError::HardwareFault(e.to_string()))?;
        let switch = divert_hardware::GpioLoadSwitch::new(pins::LOAD_SWITCH)
            .map_err(|e| DivertError::HardwareFault(e.to_string()))?;
        let mode = divert_hardware::GpioModeInput::new(pins::MODE_SELECT)
            .map_err(|e| DivertError::HardwareFault(e.to_string()))?;
        let watchdog = divert_hardware::LinuxWatchdog::open("/dev/watchdog")
            .map_err(|e| DivertError::HardwareFault(e.to_string()))?;
        serve(frontend, switch, mode, watchdog, shared, config_path, &opts)
    }
    #[cfg(not(feature = "hardware"))]
    {
        let frontend = divert_hardware::SimulatedFrontend::new(divert_hardware::WaveformConfig {
            surplus_amp: opts.surplus_amp,
            load_amp: opts.load_amp,
            dc_bias: opts.dc_bias,
            noise_amp: opts.noise_amp,
            ..divert_hardware::WaveformConfig::default()
        });
        let switch = frontend.load_switch();
        let mode = divert_hardware::SimulatedModeInput::new(opts.anti_flicker);
        let watchdog = divert_hardware::SimulatedWatchdog::default();
        serve(frontend, switch, mode, watchdog, shared, config_path, &opts)
    }
}

fn serve<F, L, M, W>(
    frontend: F,
    switch: L,
    mut mode: M,
    mut watchdog: W,
    shared: Arc<SharedControls>,
    config_path: &Path,
    opts: &RunOpts,
) -> Result<()>
where
    F: AnalogFrontend + Send + 'static,
    L: LoadSwitch + Send + 'static,
    M: ModeInput,
    W: Watchdog,
{
    let anti_flicker = opts.anti_flicker
        || mode
            .anti_flicker_selected()
            .map_err(|e| DivertError::HardwareFault(e.to_string()))?;
    shared.set_anti_flicker(anti_flicker);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            tracing::info!("shutdown requested");
            running.store(false, Ordering::Relaxed);
        })
        .map_err(|e| DivertError::State(format!("signal handler: {e}")))?;
    }
    if let Some(secs) = opts.duration {
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            running.store(false, Ordering::Relaxed);
        });
    }

    let runner = AcquisitionRunner::spawn(
        frontend,
        switch,
        Arc::clone(&shared),
        MonotonicClock::new(),
    )?;
    tracing::info!(
        config = %config_path.display(),
        anti_flicker,
        "diverter running; console ready (get/set/save/reload/reset/enable/disable/on/off/status)"
    );

    // Console lines feed the service loop; EOF just ends the console.
    let (cmd_tx, cmd_rx) = xch::unbounded::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if !line.trim().is_empty() => {
                    if cmd_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    supervise(
        &shared,
        &mut watchdog,
        &cmd_rx,
        config_path.to_path_buf(),
        &running,
        |line| println!("{line}"),
    );

    drop(runner);
    tracing::info!(
        diverted_wh = shared.diverted_wh(),
        cycles = shared.cycle_count(),
        "diverter stopped"
    );
    Ok(())
}

/// Parse and validate the settings file without touching any hardware.
pub fn check_config(config_path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(config_path)
        .map_err(|e| DivertError::Io(format!("{}: {e}", config_path.display())))?;
    let settings =
        divert_config::load_toml(&text).map_err(|e| DivertError::Config(e.to_string()))?;

    println!("{} is valid", config_path.display());
    for key in divert_config::Settings::keys() {
        if let Some(value) = settings.get(key) {
            println!("  {key} = {value}");
        }
    }
    Ok(())
}
