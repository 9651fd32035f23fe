//! `From` implementations bridging `hrfs_config` types to `hrfs_core` types.

use crate::config::{RunoutCfg, SensorCfg};

// ── SensorCfg ────────────────────────────────────────────────────────────────

impl From<&hrfs_config::Config> for SensorCfg {
    fn from(c: &hrfs_config::Config) -> Self {
        Self {
            name: c.sensor.name.clone(),
            rotation_distance: c.motion.rotation_distance,
            invert_direction: c.motion.invert_direction,
            hysteresis_bits: u32::from(c.motion.hysteresis_bits),
        }
    }
}

// ── RunoutCfg ────────────────────────────────────────────────────────────────

impl From<&hrfs_config::RunoutCfg> for RunoutCfg {
    fn from(c: &hrfs_config::RunoutCfg) -> Self {
        Self {
            underextrusion_max_rate: c.underextrusion_max_rate,
            underextrusion_period: c.underextrusion_period,
            move_evaluation_distance: c.move_evaluation_distance,
            pause_on_runout: c.pause_on_runout,
            runout_gcode: c.runout_gcode.clone(),
            pause_delay: c.pause_delay,
            event_delay: c.event_delay,
        }
    }
}
