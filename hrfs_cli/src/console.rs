//! Host console stand-in: prints monitor messages and runout actions.
//!
//! Plain output follows the usual printer-console convention (`// ` for
//! info, `!! ` for errors); `--json` turns every line into a JSON object.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hrfs_core::SensorStatus;
use hrfs_traits::{AlertSink, Clock, RunoutAction};
use serde_json::json;

#[derive(Clone)]
pub struct ConsoleSink {
    json: bool,
    clock: Arc<dyn Clock + Send + Sync>,
    runouts: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

impl ConsoleSink {
    pub fn new(json: bool, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            json,
            clock,
            runouts: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runout actions requested so far.
    pub fn runouts(&self) -> u64 {
        self.runouts.load(Ordering::Relaxed)
    }

    /// Error lines printed so far.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn line(&self, level: &str, msg: &str) {
        if self.json {
            let t = self.clock.monotonic();
            println!("{}", json!({ "t": t, "level": level, "message": msg }));
        } else if level == "error" {
            println!("!! {msg}");
        } else {
            println!("// {msg}");
        }
    }
}

impl AlertSink for ConsoleSink {
    fn respond_info(&mut self, msg: &str) {
        self.line("info", msg);
    }

    fn respond_error(&mut self, msg: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.line("error", msg);
    }

    fn runout(
        &mut self,
        action: &RunoutAction,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.runouts.fetch_add(1, Ordering::Relaxed);
        if self.json {
            println!(
                "{}",
                json!({
                    "t": action.eventtime,
                    "runout": {
                        "pause": action.pause,
                        "pause_until": action.pause_until,
                        "script": action.script,
                    }
                })
            );
        } else {
            let script = action.script.replace('\n', "; ");
            println!(
                "runout at {:.2}s: pause={} script=[{script}]",
                action.eventtime, action.pause
            );
        }
        Ok(())
    }
}

/// Status snapshot as a JSON value.
pub fn status_json(status: &SensorStatus) -> serde_json::Value {
    let m = &status.motion;
    json!({
        "enabled": status.enabled,
        "sensor_connected": status.sensor_connected,
        "magnet_state": status.magnet_state.as_str(),
        "filament_detected": status.filament_detected,
        "underextrusion_rate": status.underextrusion_rate,
        "underextrusion_detected": status.underextrusion_detected,
        "runout": status.runout,
        "position": status.position,
        "motion": {
            "detected": m.detected,
            "direction": m.direction.as_str(),
            "commanded_distance": m.commanded_distance,
            "expected_distance": m.expected_distance,
            "measured_distance": m.measured_distance,
            "measured_speed": m.measured_speed,
            "measured_volumetric_flow": m.measured_volumetric_flow,
        }
    })
}

/// One-line human summary of a status snapshot.
pub fn status_line(status: &SensorStatus) -> String {
    let m = &status.motion;
    format!(
        "position {:.3} mm, {} {:.3}/{:.3} mm, speed {:.2} mm/s, flow {:.2} mm^3/s, rate {:.3}, magnet {}, filament {}",
        status.position,
        m.direction,
        m.measured_distance,
        m.expected_distance,
        m.measured_speed,
        m.measured_volumetric_flow,
        status.underextrusion_rate,
        status.magnet_state,
        if status.filament_detected {
            "present"
        } else {
            "absent"
        },
    )
}
