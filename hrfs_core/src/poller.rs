//! Background polling.
//!
//! Spawns a thread that drives a [`SharedMonitor`] at its own re-arm times
//! and publishes the latest status snapshot through a bounded channel.
//!
//! Each `PollThread` spawns exactly one thread that is shut down and joined
//! when the `PollThread` is dropped.
use crossbeam_channel as xch;
use hrfs_traits::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::shared::SharedMonitor;
use crate::status::SensorStatus;

pub struct PollThread {
    rx: xch::Receiver<SensorStatus>,
    ticks: Arc<AtomicU64>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl PollThread {
    /// Start the monitor and poll it until dropped.
    pub fn spawn<C: Clock + Send + Sync + 'static>(monitor: SharedMonitor, clock: C) -> Self {
        let (tx, rx) = xch::bounded(1);
        let drain = rx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = ticks.clone();

        let join_handle = std::thread::spawn(move || {
            let mut wake = match monitor.start() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, "poll thread could not start monitor");
                    return;
                }
            };
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("Poll thread received shutdown signal");
                    break;
                }
                clock.sleep_until(wake);
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                let eventtime = clock.monotonic();
                wake = match monitor.tick(eventtime) {
                    Ok(next) => next,
                    Err(e) => {
                        tracing::warn!(error = %e, "poll thread stopping");
                        break;
                    }
                };
                ticks_clone.fetch_add(1, Ordering::Relaxed);

                let Ok(status) = monitor.status() else {
                    continue;
                };
                // Keep only the newest snapshot
                if let Err(xch::TrySendError::Full(status)) = tx.try_send(status) {
                    let _ = drain.try_recv();
                    let _ = tx.try_send(status);
                }
            }
            tracing::trace!("Poll thread exiting cleanly");
        });

        Self {
            rx,
            ticks,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Most recent status published since the last call.
    pub fn latest(&self) -> Option<SensorStatus> {
        self.rx.try_iter().last()
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// True once the thread has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(std::thread::JoinHandle::is_finished)
    }
}

impl Drop for PollThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // The thread exits after its current sleep, at most one poll interval.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("Poll thread joined successfully");
                }
                Err(e) => {
                    // Thread panicked; log but don't propagate (we're in Drop)
                    tracing::warn!(?e, "Poll thread panicked during shutdown");
                }
            }
        }
    }
}
