//! Orchestration: the acquisition thread and the low-priority service loop.
//!
//! The acquisition thread owns the analog frontend, the engine and the load
//! switch, pacing itself at the converter tick rate. Everything else runs at
//! low priority: console commands, digest emission and watchdog feeding, all
//! against [`SharedControls`]. The watchdog is fed only while the acquisition
//! side demonstrably makes progress, so a hung pipeline starves it and the
//! hardware reset becomes the recovery path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use divert_traits::clock::Clock;
use divert_traits::{AnalogFrontend, LoadSwitch, Watchdog};

use crate::acquisition::AcquisitionSequencer;
use crate::engine::build_engine;
use crate::error::{DivertError, Result};
use crate::shared::SharedControls;
use crate::util::tick_period_us;

/// How often the low-priority loop wakes to service commands and the watchdog.
const SERVICE_PERIOD: Duration = Duration::from_millis(50);

/// Spawns and owns the acquisition thread.
///
/// Safety: exactly one thread per runner, joined on drop, so a dropped
/// runner cannot leak a thread that still drives the load switch.
pub struct AcquisitionRunner {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl AcquisitionRunner {
    pub fn spawn<F, L, C>(
        mut frontend: F,
        mut load_switch: L,
        shared: Arc<SharedControls>,
        clock: C,
    ) -> Result<Self>
    where
        F: AnalogFrontend + Send + 'static,
        L: LoadSwitch + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let mut engine = build_engine(Arc::clone(&shared))?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let period = Duration::from_micros(tick_period_us());

        let join_handle = std::thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || {
                // Any failure before the loop leaves the load off and the
                // cycle counter frozen; the watchdog takes it from there.
                if let Err(e) = load_switch.set_on(false) {
                    tracing::warn!(error = %e, "initial load-off failed");
                }
                let mut sequencer = match AcquisitionSequencer::start(&mut frontend) {
                    Ok(seq) => seq,
                    Err(e) => {
                        tracing::error!(error = %e, "frontend failed to arm");
                        return;
                    }
                };
                let epoch = clock.now();

                loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        break;
                    }

                    match sequencer.on_tick(&mut frontend) {
                        Ok(Some(triplet)) => {
                            let now_ms = clock.ms_since(epoch);
                            if let Some(state) = engine.ingest(triplet, now_ms)
                                && let Err(e) = load_switch.set_on(state.is_on())
                            {
                                tracing::error!(error = %e, "load switch write failed");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            // A not-ready conversion is routine at startup;
                            // anything else means the frontend is sick, so
                            // drop the load and keep trying.
                            match e.downcast_ref::<DivertError>() {
                                Some(DivertError::Hardware(_)) => {
                                    tracing::debug!(error = %e, "conversion not ready");
                                }
                                _ => {
                                    tracing::error!(error = %e, "frontend read failed");
                                    let _ = load_switch.set_on(false);
                                }
                            }
                        }
                    }

                    clock.sleep(period);
                }

                let _ = load_switch.set_on(false);
                tracing::debug!("acquisition thread exiting");
            })
            .map_err(|e| DivertError::State(format!("spawn failed: {e}")))?;

        Ok(Self {
            shutdown,
            join_handle: Some(join_handle),
        })
    }
}

impl Drop for AcquisitionRunner {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "acquisition thread panicked during shutdown");
        }
    }
}

/// Feeds the watchdog only while the acquisition side makes progress.
///
/// The cycle counter must have moved since the previous service call; a
/// frozen counter means the pipeline hung and the watchdog must be allowed
/// to fire.
pub struct WatchdogGate {
    last_count: Option<u64>,
}

impl WatchdogGate {
    pub fn new() -> Self {
        Self { last_count: None }
    }

    pub fn service<W: Watchdog>(&mut self, shared: &SharedControls, watchdog: &mut W) {
        let count = shared.cycle_count();
        // The very first service feeds unconditionally: the engine may not
        // have completed a cycle yet but nothing has hung either.
        let progressing = self.last_count.is_none_or(|last| count != last);
        self.last_count = Some(count);
        if progressing {
            if let Err(e) = watchdog.feed() {
                tracing::warn!(error = %e, "watchdog feed failed");
            }
        } else {
            tracing::warn!(cycle_count = count, "cycle counter stalled, withholding watchdog feed");
        }
    }
}

impl Default for WatchdogGate {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed console command. One line, whitespace-separated, first word is
/// the verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(String),
    Set(String, String),
    Save,
    Reload,
    Reset,
    Enable,
    Disable,
    ForceOn,
    ForceOff,
    Status,
}

impl Command {
    /// Parse one console line. Rejection carries a message and changes no
    /// state.
    pub fn parse(line: &str) -> std::result::Result<Self, DivertError> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| DivertError::Command("empty line".into()))?;
        let cmd = match verb {
            "get" => {
                let key = words
                    .next()
                    .ok_or_else(|| DivertError::Command("get needs a key".into()))?;
                Command::Get(key.to_string())
            }
            "set" => {
                let key = words
                    .next()
                    .ok_or_else(|| DivertError::Command("set needs a key and a value".into()))?;
                let value = words
                    .next()
                    .ok_or_else(|| DivertError::Command("set needs a value".into()))?;
                Command::Set(key.to_string(), value.to_string())
            }
            "save" => Command::Save,
            "reload" => Command::Reload,
            "reset" => Command::Reset,
            "enable" => Command::Enable,
            "disable" => Command::Disable,
            "on" => Command::ForceOn,
            "off" => Command::ForceOff,
            "status" => Command::Status,
            other => {
                return Err(DivertError::Command(format!("unknown command: {other}")));
            }
        };
        if words.next().is_some() {
            return Err(DivertError::Command(format!(
                "trailing input after {verb}"
            )));
        }
        Ok(cmd)
    }
}

/// Execute a command against the shared controls and the settings file,
/// returning the reply line. Setting changes take effect at the next cycle
/// boundary; nothing here touches the acquisition thread directly.
pub fn apply_command(
    shared: &SharedControls,
    config_path: &Path,
    cmd: Command,
) -> std::result::Result<String, DivertError> {
    match cmd {
        Command::Get(key) => {
            let settings = shared.settings_snapshot();
            settings
                .get(&key)
                .map(|v| format!("{key} = {v}"))
                .ok_or_else(|| DivertError::Command(format!("unknown key: {key}")))
        }
        Command::Set(key, value) => {
            let mut settings = shared.settings_snapshot();
            settings
                .set(&key, &value)
                .map_err(|e| DivertError::Command(e.to_string()))?;
            shared.update_settings(settings);
            Ok(format!("{key} = {value}"))
        }
        Command::Save => {
            let settings = shared.settings_snapshot();
            divert_config::save(config_path, &settings)
                .map_err(|e| DivertError::Io(e.to_string()))?;
            Ok(format!("saved {}", config_path.display()))
        }
        Command::Reload => {
            let settings = divert_config::load_or_default(config_path);
            shared.update_settings(settings);
            Ok(format!("reloaded {}", config_path.display()))
        }
        Command::Reset => {
            shared.update_settings(divert_config::Settings::default());
            Ok("settings reset to defaults (not yet saved)".into())
        }
        Command::Enable => {
            shared.set_enabled(true);
            Ok("diversion enabled".into())
        }
        Command::Disable => {
            shared.set_enabled(false);
            Ok("diversion disabled".into())
        }
        Command::ForceOn => {
            shared.set_force_on(true);
            Ok("load forced on".into())
        }
        Command::ForceOff => {
            shared.set_force_on(false);
            Ok("load force-on cleared".into())
        }
        Command::Status => {
            let verbose = shared.settings_snapshot().verbose_telemetry;
            Ok(shared.take_digest().render(verbose))
        }
    }
}

/// The low-priority service loop. Runs until `running` clears: drains the
/// console channel, emits pending digests, and feeds the watchdog through
/// the progress gate. All output goes through `out` so the caller decides
/// where lines land.
pub fn supervise<W: Watchdog>(
    shared: &SharedControls,
    watchdog: &mut W,
    commands: &xch::Receiver<String>,
    config_path: PathBuf,
    running: &AtomicBool,
    mut out: impl FnMut(&str),
) {
    let mut gate = WatchdogGate::new();

    while running.load(Ordering::Relaxed) {
        match commands.recv_timeout(SERVICE_PERIOD) {
            Ok(line) => {
                let reply = Command::parse(&line)
                    .and_then(|cmd| apply_command(shared, &config_path, cmd));
                match reply {
                    Ok(text) => out(&text),
                    Err(e) => out(&format!("error: {e}")),
                }
            }
            Err(xch::RecvTimeoutError::Timeout) => {}
            // Console gone (stdin closed): keep servicing digests and the
            // watchdog until shutdown.
            Err(xch::RecvTimeoutError::Disconnected) => std::thread::sleep(SERVICE_PERIOD),
        }

        if shared.digest_pending() {
            let verbose = shared.settings_snapshot().verbose_telemetry;
            out(&shared.take_digest().render(verbose));
        }

        gate.service(shared, watchdog);
    }
    tracing::info!("service loop exiting");
}
