//! Deterministic replay of a recorded sensor trace.
//!
//! Each CSV row sets the clock, the host's commanded and estimated extruder
//! positions and the raw register values, then runs one tick. The monitor
//! is started at the first row and printing for the whole trace.

use std::path::Path;
use std::sync::Arc;

use eyre::Result;
use hrfs_config::{Config, TraceRow};
use hrfs_core::mocks::{ScriptedHost, ScriptedTransport};
use hrfs_traits::{ManualClock, RawReading};
use serde_json::json;

use crate::assemble::build_monitor;
use crate::console::{ConsoleSink, status_json, status_line};
use crate::monitor::Outcome;

pub fn run_replay(cfg: &Config, trace: &Path, json: bool, print_status: bool) -> Result<Outcome> {
    let rows = hrfs_config::load_trace_csv(trace)?;
    replay_rows(cfg, &rows, json, print_status)
}

pub fn replay_rows(
    cfg: &Config,
    rows: &[TraceRow],
    json: bool,
    print_status: bool,
) -> Result<Outcome> {
    let Some(first) = rows.first() else {
        eyre::bail!("trace CSV has no rows");
    };
    let clock = ManualClock::starting_at(first.time);
    let transport = ScriptedTransport::new();
    let host = ScriptedHost::new();
    host.set_filament_area(cfg.extruder.filament_area());
    let sink = ConsoleSink::new(json, Arc::new(clock.clone()));

    let mut monitor = build_monitor(
        cfg,
        Box::new(transport.clone()),
        host.clone(),
        sink.clone(),
        clock.clone(),
    )?;
    monitor.start();
    monitor.set_printing(true);
    tracing::info!(rows = rows.len(), start = first.time, "replay start");

    let mut ticks = 0_u64;
    for row in rows {
        clock.set(row.time);
        host.set_commanded(Some(row.commanded_epos));
        host.set_estimated(row.estimated_epos);
        transport.set_reading(RawReading {
            magnet_state: row.magnet,
            filament_presence: row.presence,
            full_turns: row.turns,
            angle: row.angle,
        });
        monitor.tick(row.time);
        ticks += 1;

        if print_status {
            let status = monitor.status();
            if json {
                println!("{}", json!({ "t": row.time, "status": status_json(&status) }));
            } else {
                println!("{:>9.3}s {}", row.time, status_line(&status));
            }
        }
    }

    Ok(Outcome {
        ticks,
        runouts: sink.runouts(),
        errors: sink.errors(),
        interrupted: false,
        status: monitor.status(),
    })
}
