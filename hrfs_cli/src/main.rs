//! `hrfs`: run, replay and inspect the high-resolution filament sensor.

mod assemble;
mod cli;
mod console;
mod error_fmt;
mod monitor;
mod replay;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use hrfs_config::{Config, Logging};
use hrfs_core::MagnetState;
use hrfs_core::mocks::{RecordingSink, ScriptedHost};
use hrfs_traits::MonotonicClock;
use serde_json::json;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Commands, JSON_MODE, json_mode};
use crate::console::{status_json, status_line};
use crate::error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};
use crate::monitor::Outcome;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error handler: {e}");
    }

    if let Err(err) = run(cli) {
        if json_mode() {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    // Logging comes up before the config is validated so that config errors
    // can be traced; the file sink needs the parsed [logging] section.
    let cfg = assemble::load_config(&cli.config);
    let logging = cfg.as_ref().ok().map(|c| &c.logging);
    // Held until the command returns so the file sink is flushed.
    let _file_guard = init_tracing(cli.json, cli.log_level.as_deref(), logging)?;
    let cfg = cfg?;
    tracing::debug!(config = %cli.config.display(), transport = ?cfg.transport_kind(), "config loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    match &cli.cmd {
        Commands::Monitor { sim } => {
            let outcome = monitor::run_monitor(&cfg, sim, cli.json, shutdown)?;
            finish("monitor", &outcome, cli.json)
        }
        Commands::Replay { trace, status } => {
            let outcome = replay::run_replay(&cfg, trace, cli.json, *status)?;
            finish("replay", &outcome, cli.json)
        }
        Commands::Query => query(&cfg, cli.json),
        Commands::SelfCheck => self_check(&cfg, cli.json),
    }
}

fn init_tracing(
    json: bool,
    level: Option<&str>,
    logging: Option<&Logging>,
) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => {
            let level = level
                .or_else(|| logging.and_then(|l| l.level.as_deref()))
                .unwrap_or("info");
            EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level '{level}'"))?
        }
    };

    // Console logs go to stderr; stdout carries the sensor console.
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let plain_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let mut file_guard = None;
    let file_layer = match logging.and_then(|l| l.file.as_deref()) {
        Some(file) => {
            let rotation = match logging.and_then(|l| l.rotation.as_deref()) {
                Some("daily") => tracing_appender::rolling::Rotation::DAILY,
                Some("hourly") => tracing_appender::rolling::Rotation::HOURLY,
                _ => tracing_appender::rolling::Rotation::NEVER,
            };
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file '{file}' has no file name"))?;
            let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(file_guard)
}

fn finish(what: &str, outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            json!({
                "summary": {
                    "command": what,
                    "ticks": outcome.ticks,
                    "runouts": outcome.runouts,
                    "errors": outcome.errors,
                    "interrupted": outcome.interrupted,
                    "status": status_json(&outcome.status),
                }
            })
        );
    } else {
        println!(
            "{what} finished: {} ticks, {} runout(s){}",
            outcome.ticks,
            outcome.runouts,
            if outcome.interrupted {
                ", interrupted"
            } else {
                ""
            }
        );
        println!("{}", status_line(&outcome.status));
    }
    if outcome.runouts > 0 {
        return Err(CliError::RunoutTriggered(outcome.runouts).into());
    }
    Ok(())
}

/// One poll against the configured transport, then the sensor report.
fn query(cfg: &Config, json: bool) -> Result<()> {
    let transport = assemble::open_transport(cfg)?;
    let mut monitor = assemble::build_monitor(
        cfg,
        transport,
        ScriptedHost::new(),
        RecordingSink::new(),
        MonotonicClock::new(),
    )?;
    monitor.tick(0.0);
    if json {
        println!(
            "{}",
            json!({
                "name": monitor.name(),
                "status": status_json(&monitor.status()),
                "resolution_bits": hrfs_config::RESOLUTION_BITS,
                "ignored_bits": cfg.motion.hysteresis_bits,
                "detectable_angle": monitor.detectable_angle_change(),
                "detectable_distance": monitor.detectable_distance_change(),
            })
        );
    } else {
        println!("{}", monitor.query_report());
    }
    Ok(())
}

fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let transport = assemble::open_transport(cfg)?;
    let mut monitor = assemble::build_monitor(
        cfg,
        transport,
        ScriptedHost::new(),
        RecordingSink::new(),
        MonotonicClock::new(),
    )?;
    let reading = monitor
        .probe()
        .map_err(|e| CliError::SensorCheck(format!("{e:#}")))?;
    let magnet = MagnetState::from(reading.magnet_state);
    if !magnet.is_detected() {
        return Err(CliError::SensorCheck(format!("magnet {magnet}")).into());
    }
    if reading.filament_presence != 1 {
        return Err(CliError::SensorCheck("no filament".to_string()).into());
    }
    if json {
        println!(
            "{}",
            json!({
                "ok": true,
                "magnet_state": magnet.as_str(),
                "full_turns": reading.full_turns,
                "angle": reading.angle,
            })
        );
    } else {
        println!(
            "OK: magnet {magnet}, filament present, turns {}, angle {}",
            reading.full_turns, reading.angle
        );
    }
    Ok(())
}
