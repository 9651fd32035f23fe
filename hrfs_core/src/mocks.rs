//! Scripted collaborators for tests, simulation and trace replay.
//!
//! Every mock is a cheap clone over shared state: hand one clone to the
//! monitor and keep another to drive or inspect it.
use std::sync::{Arc, Mutex};

use hrfs_traits::{AlertSink, ExtruderHost, RawReading, RegisterTransport, RunoutAction};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Counts per revolution of the encoder.
const COUNTS_PER_TURN: i64 = (1 << 12) - 1;

/// Split an absolute count into full turns and angle.
pub fn split_counts(counts: i64) -> (i32, i32) {
    let turns = counts.div_euclid(COUNTS_PER_TURN);
    let angle = counts.rem_euclid(COUNTS_PER_TURN);
    (
        i32::try_from(turns).unwrap_or(if turns < 0 { i32::MIN } else { i32::MAX }),
        // rem_euclid of a positive modulus is in 0..4095
        angle as i32,
    )
}

/// Encoder counts for `mm` of filament.
pub fn counts_for_mm(mm: f64, rotation_distance: f64) -> i64 {
    (mm / rotation_distance * COUNTS_PER_TURN as f64).round() as i64
}

#[derive(Debug)]
struct TransportState {
    reading: RawReading,
    connected: bool,
}

/// Transport returning whatever reading was scripted last; reads fail while
/// disconnected.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Connected, magnet detected, filament present, at position 0.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState {
                reading: RawReading {
                    magnet_state: 4,
                    filament_presence: 1,
                    full_turns: 0,
                    angle: 0,
                },
                connected: true,
            })),
        }
    }

    fn update(&self, f: impl FnOnce(&mut TransportState)) {
        if let Ok(mut s) = self.state.lock() {
            f(&mut s);
        }
    }

    /// Replace the whole reading and reconnect.
    pub fn set_reading(&self, reading: RawReading) {
        self.update(|s| {
            s.reading = reading;
            s.connected = true;
        });
    }

    /// Make reads fail until `reconnect`.
    pub fn disconnect(&self) {
        self.update(|s| s.connected = false);
    }

    pub fn reconnect(&self) {
        self.update(|s| s.connected = true);
    }

    pub fn set_counts(&self, counts: i64) {
        let (turns, angle) = split_counts(counts);
        self.update(|s| {
            s.reading.full_turns = turns;
            s.reading.angle = angle;
        });
    }

    /// Place the encoder at `mm` of filament.
    pub fn set_position_mm(&self, mm: f64, rotation_distance: f64) {
        self.set_counts(counts_for_mm(mm, rotation_distance));
    }

    pub fn set_magnet_state(&self, state: u8) {
        self.update(|s| s.reading.magnet_state = state);
    }

    pub fn set_filament_present(&self, present: bool) {
        self.update(|s| s.reading.filament_presence = u8::from(present));
    }
}

impl RegisterTransport for ScriptedTransport {
    fn read_registers(&mut self) -> Result<RawReading, BoxError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| BoxError::from("scripted transport poisoned"))?;
        if !guard.connected {
            return Err(BoxError::from("no response received"));
        }
        Ok(guard.reading)
    }
}

#[derive(Debug)]
struct HostState {
    commanded: Option<f64>,
    estimated: f64,
    filament_area: f64,
}

/// Extruder host with directly settable commanded/estimated positions.
#[derive(Debug, Clone)]
pub struct ScriptedHost {
    state: Arc<Mutex<HostState>>,
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHost {
    /// Both positions at 0, 1.75 mm filament.
    pub fn new() -> Self {
        let r = 1.75 / 2.0;
        Self {
            state: Arc::new(Mutex::new(HostState {
                commanded: Some(0.0),
                estimated: 0.0,
                filament_area: std::f64::consts::PI * r * r,
            })),
        }
    }

    fn update(&self, f: impl FnOnce(&mut HostState)) {
        if let Ok(mut s) = self.state.lock() {
            f(&mut s);
        }
    }

    /// `None` simulates another extruder being active.
    pub fn set_commanded(&self, epos: Option<f64>) {
        self.update(|s| s.commanded = epos);
    }

    pub fn set_estimated(&self, epos: f64) {
        self.update(|s| s.estimated = epos);
    }

    /// Command `epos` and report it as already reached.
    pub fn command(&self, epos: f64) {
        self.update(|s| {
            s.commanded = Some(epos);
            s.estimated = epos;
        });
    }

    pub fn set_filament_area(&self, area: f64) {
        self.update(|s| s.filament_area = area);
    }
}

impl ExtruderHost for ScriptedHost {
    fn commanded_position(&self) -> Option<f64> {
        self.state.lock().ok().and_then(|s| s.commanded)
    }

    fn estimated_position(&self, _eventtime: f64) -> f64 {
        self.state.lock().map(|s| s.estimated).unwrap_or(0.0)
    }

    fn filament_area(&self) -> f64 {
        self.state.lock().map(|s| s.filament_area).unwrap_or(0.0)
    }
}

/// Something the monitor sent to the host console or pause logic.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEntry {
    Info(String),
    Error(String),
    Runout(RunoutAction),
}

/// Alert sink that records everything it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<SinkEntry>>>,
    fail_runout: Arc<Mutex<bool>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every runout script fail (it is still recorded).
    pub fn fail_runout_scripts(&self, fail: bool) {
        if let Ok(mut f) = self.fail_runout.lock() {
            *f = fail;
        }
    }

    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                SinkEntry::Info(m) | SinkEntry::Error(m) => Some(m),
                SinkEntry::Runout(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                SinkEntry::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn runouts(&self) -> Vec<RunoutAction> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                SinkEntry::Runout(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut e) = self.entries.lock() {
            e.clear();
        }
    }

    fn push(&self, entry: SinkEntry) {
        if let Ok(mut e) = self.entries.lock() {
            e.push(entry);
        }
    }
}

impl AlertSink for RecordingSink {
    fn respond_info(&mut self, msg: &str) {
        self.push(SinkEntry::Info(msg.to_string()));
    }

    fn respond_error(&mut self, msg: &str) {
        self.push(SinkEntry::Error(msg.to_string()));
    }

    fn runout(&mut self, action: &RunoutAction) -> Result<(), BoxError> {
        self.push(SinkEntry::Runout(action.clone()));
        let fail = self.fail_runout.lock().map(|f| *f).unwrap_or(false);
        if fail {
            return Err(BoxError::from("script failed"));
        }
        Ok(())
    }
}
