mod cli;
mod error_fmt;
mod rt;
mod run;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::run::RunOpts;

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match &cli.log_file {
        None => {
            let builder = tracing_subscriber::fmt().with_env_filter(filter);
            if cli.json {
                builder.json().init();
            } else {
                builder.init();
            }
        }
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| ".".as_ref());
            let name = path.file_name().unwrap_or_else(|| "divert.log".as_ref());
            let (writer, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::never(dir, name),
            );
            // The guard must outlive the subscriber so buffered lines are
            // flushed on exit.
            let _ = FILE_GUARD.set(guard);
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false);
            if cli.json {
                builder.json().init();
            } else {
                builder.init();
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if !cli.json {
        let _ = color_eyre::install();
    }
    init_tracing(&cli);

    let result = match cli.cmd {
        Commands::Run {
            duration,
            anti_flicker,
            surplus_amp,
            load_amp,
            dc_bias,
            noise_amp,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => run::run(
            &cli.config,
            RunOpts {
                duration,
                anti_flicker,
                surplus_amp,
                load_amp,
                dc_bias,
                noise_amp,
                rt,
                rt_prio,
                rt_lock,
                rt_cpu,
            },
        ),
        Commands::CheckConfig => run::check_config(&cli.config),
    };

    if let Err(err) = result {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}
