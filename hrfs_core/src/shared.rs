//! Mutex-guarded monitor handle shared by the poll path and the motion
//! intercept path.
use std::sync::{Arc, Mutex};

use hrfs_traits::MoveTransform;

use crate::error::{MonitorError, Result};
use crate::monitor::FilamentMonitor;
use crate::status::SensorStatus;

/// Cloneable handle; every access holds the lock for the whole operation.
#[derive(Clone)]
pub struct SharedMonitor {
    inner: Arc<Mutex<FilamentMonitor>>,
}

impl SharedMonitor {
    pub fn new(monitor: FilamentMonitor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(monitor)),
        }
    }

    /// Run `f` with exclusive access to the monitor.
    pub fn with<T>(&self, f: impl FnOnce(&mut FilamentMonitor) -> T) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| eyre::Report::new(MonitorError::State("monitor lock poisoned".into())))?;
        Ok(f(&mut guard))
    }

    pub fn start(&self) -> Result<f64> {
        self.with(FilamentMonitor::start)
    }

    pub fn tick(&self, eventtime: f64) -> Result<f64> {
        self.with(|m| m.tick(eventtime))
    }

    pub fn note_commanded_position(&self, epos: f64) -> Result<()> {
        self.with(|m| m.note_commanded_position(epos))
    }

    pub fn set_printing(&self, printing: bool) -> Result<()> {
        self.with(|m| m.set_printing(printing))
    }

    pub fn status(&self) -> Result<SensorStatus> {
        self.with(|m| m.status())
    }
}

/// Motion stage that forwards every move and reports the commanded extruder
/// position to the monitor.
pub struct CommandedMoveTap<N> {
    next: N,
    monitor: SharedMonitor,
}

impl<N: MoveTransform> CommandedMoveTap<N> {
    pub fn new(next: N, monitor: SharedMonitor) -> Self {
        Self { next, monitor }
    }

    pub fn next_mut(&mut self) -> &mut N {
        &mut self.next
    }
}

impl<N: MoveTransform> MoveTransform for CommandedMoveTap<N> {
    fn move_to(
        &mut self,
        newpos: [f64; 4],
        speed: f64,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.next.move_to(newpos, speed)?;
        self.monitor
            .note_commanded_position(newpos[3])
            .map_err(|e| Box::<dyn std::error::Error + Send + Sync>::from(e.to_string()))
    }

    fn position(&self) -> [f64; 4] {
        self.next.position()
    }
}
