//! Commanded moves, the sensor events observed during them, and the ledger
//! that keeps the most recent ones.
//!
//! All lists are newest first: index 0 of the ledger is the move currently
//! being executed, index 0 of a move's event history is its latest event.
use std::collections::VecDeque;
use std::fmt;

use crate::config::LEDGER_CAPACITY;

/// One sensor poll attributed to a commanded move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub eventtime: f64,
    /// Filament position measured by the sensor (mm).
    pub position: f64,
    /// Change of `position` since the previous poll.
    pub distance: f64,
    /// Estimated extruder position at `eventtime`.
    pub epos: f64,
}

/// Sign of the measured filament movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionDirection {
    Idle,
    Extruding,
    Reversing,
}

impl MotionDirection {
    pub fn from_distance(distance: f64) -> Self {
        if distance > 0.0 {
            Self::Extruding
        } else if distance < 0.0 {
            Self::Reversing
        } else {
            Self::Idle
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extruding => "extruding",
            Self::Reversing => "reversing",
        }
    }
}

impl fmt::Display for MotionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extruder move as commanded by the host, with the sensor's view of it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandedMove {
    /// When the move was first observed.
    pub eventtime: f64,
    /// Sensor position when the move was first observed.
    pub pos: f64,
    /// Extruder position the move starts from.
    pub last_epos: f64,
    /// Extruder position the move ends at.
    pub epos: f64,
    /// `epos - last_epos`.
    pub distance: f64,
    /// Set once a newer move replaced this one or printing stopped.
    pub ended: bool,
    sensor_events: Vec<SensorEvent>,
    first_event: Option<SensorEvent>,
    last_event: Option<SensorEvent>,
    first_motion_event: Option<SensorEvent>,
    last_motion_event: Option<SensorEvent>,
}

impl CommandedMove {
    pub fn new(eventtime: f64, pos: f64, last_epos: f64, epos: f64) -> Self {
        Self {
            eventtime,
            pos,
            last_epos,
            epos,
            distance: epos - last_epos,
            ended: false,
            sensor_events: Vec::new(),
            first_event: None,
            last_event: None,
            first_motion_event: None,
            last_motion_event: None,
        }
    }

    /// Attribute a sensor event to this move. The event is kept in the
    /// history only when `capture_history` is on.
    pub fn add_sensor_event(&mut self, event: SensorEvent, capture_history: bool) {
        if capture_history {
            self.sensor_events.insert(0, event);
        }
        if self.first_event.is_none() {
            self.first_event = Some(event);
        }
        self.last_event = Some(event);
        if event.distance != 0.0 {
            if self.first_motion_event.is_none() {
                self.first_motion_event = Some(event);
            }
            self.last_motion_event = Some(event);
        }
    }

    /// Captured events, newest first.
    pub fn sensor_events(&self) -> &[SensorEvent] {
        &self.sensor_events
    }

    pub fn first_event(&self) -> Option<&SensorEvent> {
        self.first_event.as_ref()
    }

    pub fn last_event(&self) -> Option<&SensorEvent> {
        self.last_event.as_ref()
    }

    pub fn first_motion_event(&self) -> Option<&SensorEvent> {
        self.first_motion_event.as_ref()
    }

    pub fn last_motion_event(&self) -> Option<&SensorEvent> {
        self.last_motion_event.as_ref()
    }

    /// True once the filament moved during this move, the latest poll saw no
    /// motion, and at least `dwell` seconds passed since the last motion.
    pub fn has_stopped_moving(&self, dwell: f64) -> bool {
        let (Some(last_motion), Some(last)) = (self.last_motion_event, self.last_event) else {
            return false;
        };
        last.distance == 0.0 && last.eventtime - last_motion.eventtime >= dwell
    }

    /// Seconds between the first and last observed motion.
    pub fn duration(&self) -> Option<f64> {
        let last = self.last_motion_event?;
        let first = self.first_motion_event?;
        Some(last.eventtime - first.eventtime)
    }

    /// Extruder distance the host estimates was covered so far.
    pub fn expected_distance(&self) -> Option<f64> {
        self.last_event.map(|e| e.epos - self.last_epos)
    }

    /// Filament distance the sensor measured between the first and last
    /// event, 0 before any event.
    pub fn measured_distance(&self) -> f64 {
        match (self.first_event, self.last_event) {
            (Some(first), Some(last)) => last.position - first.position,
            _ => 0.0,
        }
    }

    /// Measured filament speed in mm/s.
    pub fn speed(&self) -> Option<f64> {
        let duration = self.duration().filter(|d| *d != 0.0)?;
        Some(self.measured_distance() / duration)
    }

    /// `measured / expected`, 0 when nothing is expected.
    pub fn extrusion_rate(&self) -> f64 {
        match self.expected_distance() {
            Some(expected) if expected != 0.0 => self.measured_distance() / expected,
            _ => 0.0,
        }
    }

    pub fn detected(&self) -> bool {
        self.measured_distance() != 0.0
    }

    pub fn direction(&self) -> MotionDirection {
        MotionDirection::from_distance(self.measured_distance())
    }

    /// Merge two adjacent moves into one spanning both.
    ///
    /// `older` supplies the start, `newer` the end. Event history is kept
    /// newest first.
    pub fn combine(newer: &Self, older: &Self) -> Self {
        let mut merged = Self::new(older.eventtime, older.pos, older.last_epos, newer.epos);
        merged.ended = newer.ended;
        merged.first_event = older.first_event.or(newer.first_event);
        merged.first_motion_event = older.first_motion_event.or(newer.first_motion_event);
        merged.last_motion_event = newer.last_motion_event.or(older.last_motion_event);
        merged.last_event = newer.last_event.or(older.last_event);
        merged.sensor_events = newer
            .sensor_events
            .iter()
            .chain(older.sensor_events.iter())
            .copied()
            .collect();
        merged
    }
}

/// Bounded, newest-first history of commanded moves.
#[derive(Debug, Clone)]
pub struct MoveLedger {
    moves: VecDeque<CommandedMove>,
    capacity: usize,
}

impl Default for MoveLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveLedger {
    pub fn new() -> Self {
        Self::with_capacity(LEDGER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            moves: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// End the current move and make a new one current, evicting the oldest
    /// moves beyond capacity.
    pub fn start_move(&mut self, eventtime: f64, pos: f64, last_epos: f64, epos: f64) {
        if let Some(current) = self.moves.front_mut() {
            current.ended = true;
        }
        self.moves
            .push_front(CommandedMove::new(eventtime, pos, last_epos, epos));
        self.moves.truncate(self.capacity);
    }

    /// The move currently being executed.
    pub fn current(&self) -> Option<&CommandedMove> {
        self.moves.front()
    }

    /// Attribute `event` to the current move if it is still open. Returns
    /// whether the event was recorded.
    pub fn record_event(&mut self, event: SensorEvent, capture_history: bool) -> bool {
        match self.moves.front_mut() {
            Some(current) if !current.ended => {
                current.add_sensor_event(event, capture_history);
                true
            }
            _ => false,
        }
    }

    /// Extruder estimate of the current move's latest event.
    pub fn last_observed_epos(&self) -> Option<f64> {
        self.current()?.last_event().map(|e| e.epos)
    }

    /// Fold moves newest to oldest until the expected distance reaches
    /// `distance`.
    pub fn combine_for_distance(&self, distance: f64) -> Option<CommandedMove> {
        self.fold(Some(distance))
    }

    /// Fold the whole ledger into one move.
    pub fn combine_all(&self) -> Option<CommandedMove> {
        self.fold(None)
    }

    fn fold(&self, window: Option<f64>) -> Option<CommandedMove> {
        let mut combined: Option<CommandedMove> = None;
        for mv in &self.moves {
            let next = match combined.take() {
                None => mv.clone(),
                Some(newer) => CommandedMove::combine(&newer, mv),
            };
            let reached = match (window, next.expected_distance()) {
                (Some(window), Some(expected)) => expected >= window,
                _ => false,
            };
            combined = Some(next);
            if reached {
                break;
            }
        }
        combined
    }

    /// True once the current move has stopped moving for `dwell` seconds.
    pub fn has_stopped_moving(&self, dwell: f64) -> bool {
        self.current().is_some_and(|m| m.has_stopped_moving(dwell))
    }

    pub fn end_all(&mut self) {
        for mv in &mut self.moves {
            mv.ended = true;
        }
    }

    pub fn clear(&mut self) {
        self.moves.clear();
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Moves newest first.
    pub fn iter(&self) -> impl Iterator<Item = &CommandedMove> {
        self.moves.iter()
    }
}
