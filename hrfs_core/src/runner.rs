//! Synchronous drivers for the poll loop.
use std::sync::atomic::{AtomicBool, Ordering};

use hrfs_traits::Clock;

use crate::error::Result;
use crate::shared::SharedMonitor;

/// What a bounded run did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Time the next tick would have run.
    pub next_wake: f64,
    /// True when the run ended because `stop` was raised.
    pub interrupted: bool,
}

/// Start the monitor and tick it on `clock` until `until` is reached or
/// `stop` is raised, whichever happens first.
///
/// Every tick is scheduled at the time the previous one returned; the tick
/// itself receives the clock reading after waking.
pub fn run_until<C: Clock + ?Sized>(
    monitor: &SharedMonitor,
    clock: &C,
    until: f64,
    stop: &AtomicBool,
) -> Result<RunSummary> {
    run_until_with(monitor, clock, until, stop, |_| Ok(()))
}

/// [`run_until`], calling `on_wake` with the clock reading right before each
/// tick. Simulations use it to move the world forward between polls.
pub fn run_until_with<C: Clock + ?Sized>(
    monitor: &SharedMonitor,
    clock: &C,
    until: f64,
    stop: &AtomicBool,
    mut on_wake: impl FnMut(f64) -> Result<()>,
) -> Result<RunSummary> {
    let mut wake = monitor.start()?;
    let mut ticks = 0_u64;
    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(RunSummary {
                ticks,
                next_wake: wake,
                interrupted: true,
            });
        }
        if wake >= until {
            return Ok(RunSummary {
                ticks,
                next_wake: wake,
                interrupted: false,
            });
        }
        clock.sleep_until(wake);
        let eventtime = clock.monotonic();
        on_wake(eventtime)?;
        wake = monitor.tick(eventtime)?;
        ticks += 1;
    }
}
