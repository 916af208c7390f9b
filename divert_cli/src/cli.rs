//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "divert", version, about = "Surplus power diverter")]
pub struct Cli {
    /// Path to the settings TOML
    #[arg(long, value_name = "FILE", default_value = "etc/divert_settings.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also append logs to this file
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the diverter with a console on stdin
    Run {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,

        /// Start in anti-flicker (hysteresis band) mode
        #[arg(long, action = ArgAction::SetTrue)]
        anti_flicker: bool,

        /// Simulated site: grid current amplitude with the load off, in ADC
        /// counts (positive = export)
        #[arg(long, value_name = "COUNTS", default_value_t = 60.0)]
        surplus_amp: f64,

        /// Simulated site: dump load current draw, in ADC counts
        #[arg(long, value_name = "COUNTS", default_value_t = 100.0)]
        load_amp: f64,

        /// Simulated site: standing DC error on all channels, in ADC counts
        #[arg(long, value_name = "COUNTS", default_value_t = 0.0)]
        dc_bias: f64,

        /// Simulated site: white noise amplitude, in ADC counts
        #[arg(long, value_name = "COUNTS", default_value_t = 0.0)]
        noise_amp: f64,

        /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on supported OSes.\n\nLinux: Attempts SCHED_FIFO priority, pins to one CPU, and locks the process address space into RAM to reduce page faults while the acquisition loop runs at the converter tick rate. May require elevated privileges or ulimits (e.g., memlock)."
        )]
        rt: bool,

        /// Real-time priority for SCHED_FIFO on Linux (1..=max)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,

        /// Select memory locking mode for --rt: none, current, or all
        #[arg(long, value_enum, value_name = "MODE")]
        rt_lock: Option<RtLock>,

        /// CPU index to pin the process to when --rt is enabled (Linux only)
        #[arg(long, value_name = "CPU")]
        rt_cpu: Option<usize>,
    },
    /// Parse and validate the settings file, then exit
    CheckConfig,
}
