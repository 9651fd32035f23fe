//! Configuration types for the filament monitor.
//!
//! These are the runtime configuration structs used by `FilamentMonitor`.
//! They are separate from the TOML-deserialized config in `hrfs_config`.

/// Seconds between two polls of the sensor.
pub const CHECK_RUNOUT_INTERVAL: f64 = 0.100;
/// Alerts are suppressed for this long after the monitor starts.
pub const STARTUP_GRACE: f64 = 2.0;
/// Moves kept in the ledger, newest first.
pub const LEDGER_CAPACITY: usize = 100;
/// Bits per revolution reported by the encoder.
pub const RESOLUTION_BITS: u32 = 12;
/// Dwell after the last motion before a move counts as stopped.
pub const DEFAULT_STOP_DWELL: f64 = 0.1;

/// Sensor geometry and identity.
#[derive(Debug, Clone)]
pub struct SensorCfg {
    /// Prefix for console messages.
    pub name: String,
    /// Millimetres of filament per wheel revolution.
    pub rotation_distance: f64,
    pub invert_direction: bool,
    /// Low bits of the absolute position treated as noise.
    pub hysteresis_bits: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            name: "filament_sensor".to_string(),
            rotation_distance: 23.0,
            invert_direction: false,
            hysteresis_bits: 3,
        }
    }
}

impl SensorCfg {
    /// `-1.0` when the sensor is mounted reversed.
    pub fn direction_sign(&self) -> f64 {
        if self.invert_direction { -1.0 } else { 1.0 }
    }
}

/// Under-extrusion and runout policy.
#[derive(Debug, Clone)]
pub struct RunoutCfg {
    /// Largest tolerated `1 - measured/expected` before the timer starts.
    pub underextrusion_max_rate: f64,
    /// Seconds the rate must stay above the maximum before alerting.
    pub underextrusion_period: f64,
    /// Commanded distance (mm) the evaluation window spans.
    pub move_evaluation_distance: f64,
    pub pause_on_runout: bool,
    pub runout_gcode: String,
    pub pause_delay: f64,
    /// Quiet period after an alert.
    pub event_delay: f64,
}

impl Default for RunoutCfg {
    fn default() -> Self {
        Self {
            underextrusion_max_rate: 0.5,
            underextrusion_period: 5.0,
            move_evaluation_distance: 3.0,
            pause_on_runout: true,
            runout_gcode: String::new(),
            pause_delay: 0.5,
            event_delay: 3.0,
        }
    }
}

impl RunoutCfg {
    /// G-code run by a runout alert; always ends with `M400`.
    pub fn runout_script(&self) -> String {
        let prefix = if self.pause_on_runout { "PAUSE\n" } else { "" };
        format!("{prefix}{}\nM400", self.runout_gcode)
    }
}
