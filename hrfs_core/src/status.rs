//! Status snapshot reported to the host on every query.

use crate::anomaly::MagnetState;
use crate::moves::MotionDirection;

/// Motion derived from the current evaluation move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionStatus {
    pub detected: bool,
    pub direction: MotionDirection,
    /// Commanded distance of the evaluation window; 0 once it ended.
    pub commanded_distance: f64,
    pub expected_distance: f64,
    pub measured_distance: f64,
    /// mm/s; 0 once the window ended or without motion.
    pub measured_speed: f64,
    /// mm³/s.
    pub measured_volumetric_flow: f64,
}

impl Default for MotionStatus {
    fn default() -> Self {
        Self {
            detected: false,
            direction: MotionDirection::Idle,
            commanded_distance: 0.0,
            expected_distance: 0.0,
            measured_distance: 0.0,
            measured_speed: 0.0,
            measured_volumetric_flow: 0.0,
        }
    }
}

/// Everything the host can read about the sensor at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorStatus {
    pub enabled: bool,
    pub sensor_connected: bool,
    pub magnet_state: MagnetState,
    pub filament_detected: bool,
    pub motion: MotionStatus,
    /// 0 unless printing.
    pub underextrusion_rate: f64,
    pub underextrusion_detected: bool,
    pub runout: bool,
    /// Absolute filament position in mm.
    pub position: f64,
}
