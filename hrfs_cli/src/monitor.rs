//! Live monitor over a simulated print.
//!
//! A simulated extruder is commanded at a constant speed while a simulated
//! sensor sees `1 - slip` of that filament. The monitor polls the sensor
//! through the configured wire protocol exactly as it would on hardware.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use eyre::Result;
use hrfs_config::Config;
use hrfs_core::mocks::{ScriptedHost, counts_for_mm};
use hrfs_core::runner::{RunSummary, run_until_with};
use hrfs_core::{SensorStatus, SharedMonitor};
use hrfs_hardware::SimulatedSensor;
use hrfs_traits::{Clock, ManualClock, MonotonicClock};

use crate::assemble::{build_monitor, sim_transport};
use crate::cli::SimArgs;
use crate::console::ConsoleSink;

/// What a monitor or replay run ended with.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub ticks: u64,
    pub runouts: u64,
    pub errors: u64,
    pub interrupted: bool,
    pub status: SensorStatus,
}

pub fn run_monitor(
    cfg: &Config,
    sim: &SimArgs,
    json: bool,
    shutdown: Arc<AtomicBool>,
) -> Result<Outcome> {
    if !(sim.duration.is_finite() && sim.duration > 0.0) {
        eyre::bail!("--duration must be > 0");
    }
    if !(0.0..=1.0).contains(&sim.slip) {
        eyre::bail!("--slip must be in [0, 1]");
    }
    if sim.realtime {
        drive(cfg, sim, json, MonotonicClock::new(), &shutdown)
    } else {
        drive(cfg, sim, json, ManualClock::new(), &shutdown)
    }
}

fn drive<C>(
    cfg: &Config,
    sim: &SimArgs,
    json: bool,
    clock: C,
    shutdown: &AtomicBool,
) -> Result<Outcome>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    let sensor = SimulatedSensor::new();
    sensor.corrupt_next_frames(sim.corrupt_frames);
    let host = ScriptedHost::new();
    host.set_filament_area(cfg.extruder.filament_area());
    let sink = ConsoleSink::new(json, Arc::new(clock.clone()));

    let monitor = build_monitor(
        cfg,
        sim_transport(cfg, sensor.clone()),
        host.clone(),
        sink.clone(),
        clock.clone(),
    )?;
    let shared = SharedMonitor::new(monitor);
    shared.set_printing(true)?;

    let rotation_distance = cfg.motion.rotation_distance;
    let sign = if cfg.motion.invert_direction { -1 } else { 1 };
    let t0 = clock.monotonic();
    let until = t0 + sim.duration;
    let mut fed_counts = 0_i64;
    let mut filament_gone = false;

    tracing::info!(
        duration = sim.duration,
        speed = sim.speed,
        slip = sim.slip,
        realtime = sim.realtime,
        "simulated print start"
    );
    let summary: RunSummary = run_until_with(&shared, &clock, until, shutdown, |now| {
        let elapsed = now - t0;
        if sim.disconnect_after.is_some_and(|t| elapsed >= t) {
            sensor.set_connected(false);
        }
        if !filament_gone && sim.runout_after.is_some_and(|t| elapsed >= t) {
            tracing::info!(elapsed, "filament runs out");
            sensor.set_filament_present(false);
            filament_gone = true;
        }

        let commanded = sim.speed * elapsed;
        host.command(commanded);
        // Without filament the wheel stops turning
        if !filament_gone {
            let target = counts_for_mm(commanded * (1.0 - sim.slip), rotation_distance) * sign;
            sensor.rotate_counts(target - fed_counts);
            fed_counts = target;
        }
        Ok(())
    })?;

    let status = shared.status()?;
    tracing::info!(
        ticks = summary.ticks,
        runouts = sink.runouts(),
        interrupted = summary.interrupted,
        "simulated print end"
    );
    Ok(Outcome {
        ticks: summary.ticks,
        runouts: sink.runouts(),
        errors: sink.errors(),
        interrupted: summary.interrupted,
        status,
    })
}
