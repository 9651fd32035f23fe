//! The poll loop: read the sensor, attribute motion to commanded moves and
//! raise alerts.
//!
//! `FilamentMonitor` is single-threaded; wrap it in
//! [`SharedMonitor`](crate::shared::SharedMonitor) when the poll path and the
//! move-intercept path run on different threads.
use std::sync::Arc;

use hrfs_traits::{AlertSink, Clock, ExtruderHost, RawReading, RegisterTransport, RunoutAction};

use crate::anomaly::{self, AnomalyEngine, AnomalyEvent, Health, MagnetState};
use crate::config::{
    CHECK_RUNOUT_INTERVAL, DEFAULT_STOP_DWELL, RESOLUTION_BITS, RunoutCfg, STARTUP_GRACE,
    SensorCfg,
};
use crate::edge::EdgeTrigger;
use crate::error::{MonitorError, Result};
use crate::moves::{CommandedMove, MotionDirection, MoveLedger, SensorEvent};
use crate::rotation::RotationDecoder;
use crate::status::{MotionStatus, SensorStatus};

pub struct FilamentMonitor {
    pub(crate) sensor: SensorCfg,
    pub(crate) runout: RunoutCfg,
    pub(crate) transport: Box<dyn RegisterTransport + Send>,
    pub(crate) host: Box<dyn ExtruderHost + Send>,
    pub(crate) alerts: Box<dyn AlertSink + Send>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) rotation: RotationDecoder,
    pub(crate) ledger: MoveLedger,
    pub(crate) anomalies: AnomalyEngine,
    pub(crate) evaluation_move: Option<CommandedMove>,
    pub(crate) position: f64,
    pub(crate) last_epos: f64,
    pub(crate) magnet_state: MagnetState,
    pub(crate) sensor_connected: EdgeTrigger,
    pub(crate) filament_present: EdgeTrigger,
    pub(crate) enabled: bool,
    pub(crate) printing: bool,
    pub(crate) capture_history: bool,
    pub(crate) min_event_time: f64,
}

impl core::fmt::Debug for FilamentMonitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FilamentMonitor")
            .field("name", &self.sensor.name)
            .field("position", &self.position)
            .field("last_epos", &self.last_epos)
            .field("printing", &self.printing)
            .field("moves", &self.ledger.len())
            .finish()
    }
}

impl FilamentMonitor {
    pub(crate) fn from_parts(
        sensor: SensorCfg,
        runout: RunoutCfg,
        transport: Box<dyn RegisterTransport + Send>,
        host: Box<dyn ExtruderHost + Send>,
        alerts: Box<dyn AlertSink + Send>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let rotation = RotationDecoder::new(RESOLUTION_BITS, sensor.hysteresis_bits);
        let anomalies =
            AnomalyEngine::new(runout.underextrusion_max_rate, runout.underextrusion_period);
        Self {
            sensor,
            runout,
            transport,
            host,
            alerts,
            clock,
            rotation,
            ledger: MoveLedger::new(),
            anomalies,
            evaluation_move: None,
            position: 0.0,
            last_epos: 0.0,
            magnet_state: MagnetState::default(),
            sensor_connected: EdgeTrigger::new(),
            filament_present: EdgeTrigger::new(),
            enabled: true,
            printing: false,
            capture_history: false,
            min_event_time: f64::INFINITY,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Host is ready: open the startup grace window and return the time of
    /// the first tick.
    pub fn start(&mut self) -> f64 {
        let now = self.clock.monotonic();
        self.min_event_time = now + STARTUP_GRACE;
        tracing::info!(sensor = %self.sensor.name, "ready");
        now
    }

    pub fn set_printing(&mut self, printing: bool) {
        if printing {
            tracing::info!(sensor = %self.sensor.name, "printing");
            for event in self.anomalies.reset() {
                self.report(&event);
            }
            self.printing = true;
            self.ledger.clear();
            self.evaluation_move = None;
        } else {
            tracing::info!(sensor = %self.sensor.name, "not printing");
            self.printing = false;
            self.ledger.end_all();
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Keep per-move event history from now on.
    pub fn capture_history(&mut self, capture: bool) {
        self.capture_history = capture;
    }

    /// The host re-based the extruder axis; the next commanded distance is
    /// measured from `epos`.
    pub fn set_extruder_position(&mut self, epos: f64) {
        self.last_epos = epos;
    }

    // ── Poll loop ────────────────────────────────────────────────────────────

    /// One poll. Returns the time of the next one.
    pub fn tick(&mut self, eventtime: f64) -> f64 {
        self.update_state_from_sensor();
        self.evaluation_move = self
            .ledger
            .combine_for_distance(self.runout.move_evaluation_distance);

        if eventtime >= self.min_event_time && self.enabled {
            self.check_print_issues(eventtime);
        }
        eventtime + CHECK_RUNOUT_INTERVAL
    }

    /// A commanded extruder position observed out of band, e.g. by the
    /// motion intercept.
    pub fn note_commanded_position(&mut self, epos: f64) {
        let eventtime = self.clock.monotonic();
        self.open_move_if_changed(eventtime, epos);
    }

    fn inspect_commanded_move(&mut self, eventtime: f64) {
        // None while another extruder is active
        if let Some(epos) = self.host.commanded_position() {
            self.open_move_if_changed(eventtime, epos);
        }
    }

    fn open_move_if_changed(&mut self, eventtime: f64, epos: f64) {
        if epos - self.last_epos == 0.0 {
            return;
        }
        let last_epos = self.ledger.last_observed_epos().unwrap_or(self.last_epos);
        self.ledger
            .start_move(eventtime, self.position, last_epos, epos);
        self.last_epos = epos;
    }

    fn update_state_from_sensor(&mut self) {
        let eventtime = self.clock.monotonic();
        self.inspect_commanded_move(eventtime);

        let reading = match self.transport.read_registers() {
            Ok(reading) => Some(reading),
            Err(e) => {
                tracing::debug!(sensor = %self.sensor.name, error = %e, "sensor read failed");
                None
            }
        };
        self.set_connected(reading.is_some());
        let Some(reading) = reading else {
            return;
        };

        self.magnet_state = MagnetState::from(reading.magnet_state);
        self.set_filament_present(reading.filament_presence == 1);

        self.rotation.update(reading.full_turns, reading.angle);
        let degrees = self.rotation.absolute_degrees() * self.sensor.direction_sign();
        let new_position = self.sensor.rotation_distance * degrees / 360.0;
        let distance = new_position - self.position;
        self.position = new_position;

        let event = SensorEvent {
            eventtime,
            position: new_position,
            distance,
            epos: self.host.estimated_position(eventtime),
        };
        self.ledger.record_event(event, self.capture_history);
    }

    fn set_connected(&mut self, connected: bool) {
        let Some(edge) = self
            .sensor_connected
            .set_logged("sensor_connected", connected)
        else {
            return;
        };
        if edge.to {
            self.respond_info("Reconnected");
        } else {
            self.respond_error("No longer connected or data cannot be read");
        }
    }

    fn set_filament_present(&mut self, present: bool) {
        let Some(edge) = self
            .filament_present
            .set_logged("filament_present", present)
        else {
            return;
        };
        if edge.to {
            self.respond_info("Filament present");
        } else {
            self.respond_error("Filament not present");
        }
    }

    fn check_print_issues(&mut self, eventtime: f64) {
        if !self.printing {
            return;
        }
        let now = self.clock.monotonic();
        let health = self.health();
        let evaluation = self
            .anomalies
            .evaluate(now, health, self.evaluation_move.as_ref());
        for event in &evaluation.events {
            self.report(event);
        }
        if evaluation.fire_runout {
            self.runout_event(eventtime);
        }
    }

    fn runout_event(&mut self, eventtime: f64) {
        let action = RunoutAction {
            eventtime,
            pause: self.runout.pause_on_runout,
            pause_until: eventtime + self.runout.pause_delay,
            script: self.runout.runout_script(),
        };
        tracing::info!(sensor = %self.sensor.name, pause = action.pause, "runout event");
        if let Err(e) = self.alerts.runout(&action) {
            let err = MonitorError::Alert(e.to_string());
            tracing::error!(sensor = %self.sensor.name, error = %err, "script running error");
        }
        self.min_event_time = self.clock.monotonic() + self.runout.event_delay;
    }

    fn report(&mut self, event: &AnomalyEvent) {
        match event {
            AnomalyEvent::Unhealthy { reason } => {
                self.respond_error(&format!("Unhealthy ({reason})"));
            }
            AnomalyEvent::UnderextrusionSuspected { rate } => {
                tracing::debug!(sensor = %self.sensor.name, rate, "underextrusion timer started");
            }
            AnomalyEvent::UnderextrusionDetected { period } => {
                self.respond_error(&format!("Detected underextrusion for over {period:.2}s"));
            }
            AnomalyEvent::UnderextrusionCleared { after: Some(after) } => {
                self.respond_info(&format!("Underextrusion cleared after {after:.2}s"));
            }
            AnomalyEvent::UnderextrusionCleared { after: None }
            | AnomalyEvent::Healthy
            | AnomalyEvent::RunoutDetected
            | AnomalyEvent::RunoutCleared => {}
        }
    }

    fn respond_info(&mut self, msg: &str) {
        let line = format!("{}: {msg}", self.sensor.name);
        self.alerts.respond_info(&line);
    }

    fn respond_error(&mut self, msg: &str) {
        let line = format!("{}: {msg}", self.sensor.name);
        tracing::warn!(sensor = %self.sensor.name, "{msg}");
        self.alerts.respond_error(&line);
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Read the sensor once without touching any state.
    pub fn probe(&mut self) -> Result<RawReading> {
        self.transport
            .read_registers()
            .map_err(|e| eyre::Report::new(MonitorError::Transport(e.to_string())))
    }

    pub fn health(&self) -> Health {
        Health {
            connected: self.sensor_connected.is_true(),
            magnet: self.magnet_state,
            filament_present: self.filament_present.is_true(),
        }
    }

    pub fn status(&self) -> SensorStatus {
        let mv = self.evaluation_move.as_ref();
        let open = mv.filter(|m| !m.ended);
        let speed = open.and_then(CommandedMove::speed);
        let motion = MotionStatus {
            detected: mv.is_some_and(CommandedMove::detected),
            direction: mv.map_or(MotionDirection::Idle, CommandedMove::direction),
            commanded_distance: open.map_or(0.0, |m| m.distance),
            expected_distance: mv.and_then(CommandedMove::expected_distance).unwrap_or(0.0),
            measured_distance: mv.map_or(0.0, CommandedMove::measured_distance),
            measured_speed: speed.unwrap_or(0.0),
            measured_volumetric_flow: speed.map_or(0.0, |s| self.host.filament_area() * s),
        };
        let underextrusion_rate = if self.printing {
            anomaly::underextrusion_rate(mv)
        } else {
            0.0
        };
        SensorStatus {
            enabled: self.enabled,
            sensor_connected: self.sensor_connected.is_true(),
            magnet_state: self.magnet_state,
            filament_detected: self.filament_present.is_true(),
            motion,
            underextrusion_rate,
            underextrusion_detected: self.anomalies.is_underextruding(),
            runout: self.anomalies.is_runout(),
            position: self.position,
        }
    }

    /// Smallest angle change the sensor resolves, in degrees.
    pub fn detectable_angle_change(&self) -> f64 {
        self.rotation.angular_resolution()
    }

    /// Smallest filament movement the sensor resolves, in mm.
    pub fn detectable_distance_change(&self) -> f64 {
        self.detectable_angle_change() / 360.0 * self.sensor.rotation_distance
    }

    /// Human-readable summary for the sensor query command.
    pub fn query_report(&self) -> String {
        let detected = |b: bool| if b { "detected" } else { "not detected" };
        let connected = if self.sensor_connected.is_true() {
            "connected"
        } else {
            "not connected"
        };
        format!(
            "Filament Sensor {name}:\n\
             - sensor {connected}\n\
             - filament {filament}\n\
             - runout {runout}\n\
             - underextrusion {underextrusion}\n\
             - resolution: {bits} bits (lower {ignored} bits are ignored)\n\
             - smallest detectable angular change: {angle:.4} degree\n\
             - smallest detectable movement: {mm:.4} mm",
            name = self.sensor.name,
            filament = detected(self.filament_present.is_true()),
            runout = detected(self.anomalies.is_runout()),
            underextrusion = detected(self.anomalies.is_underextruding()),
            bits = self.rotation.resolution_bits(),
            ignored = self.rotation.ignore_bits(),
            angle = self.detectable_angle_change(),
            mm = self.detectable_distance_change(),
        )
    }

    /// True once the current move saw motion and then none for the default
    /// dwell.
    pub fn has_stopped_moving(&self) -> bool {
        self.ledger.has_stopped_moving(DEFAULT_STOP_DWELL)
    }

    /// The whole ledger folded into one move.
    pub fn combined_moves(&self) -> Option<CommandedMove> {
        self.ledger.combine_all()
    }

    pub fn evaluation_move(&self) -> Option<&CommandedMove> {
        self.evaluation_move.as_ref()
    }

    pub fn ledger(&self) -> &MoveLedger {
        &self.ledger
    }

    pub fn name(&self) -> &str {
        &self.sensor.name
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn last_epos(&self) -> f64 {
        self.last_epos
    }

    pub fn magnet_state(&self) -> MagnetState {
        self.magnet_state
    }

    pub fn is_connected(&self) -> bool {
        self.sensor_connected.is_true()
    }

    pub fn is_printing(&self) -> bool {
        self.printing
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_unhealthy(&self) -> bool {
        self.anomalies.is_unhealthy()
    }

    pub fn is_runout(&self) -> bool {
        self.anomalies.is_runout()
    }

    pub fn is_underextruding(&self) -> bool {
        self.anomalies.is_underextruding()
    }

    /// Evaluation is suppressed before this time.
    pub fn min_event_time(&self) -> f64 {
        self.min_event_time
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }
}
