//! Non-linear extrusion compensation.
//!
//! Sits in the host's motion pipeline in front of the toolhead. For positive
//! extrusion it maps the requested extruder speed through a polynomial and
//! stretches or shrinks the extruded length to match.
use hrfs_traits::{MoveTransform, ToolheadView};

use crate::error::MonitorError;

/// Moves with less xyz travel than this are extrude-only.
pub const EXTRUDE_ONLY_EPSILON: f64 = 1e-9;

/// `c[0] + c[1]·x + c[2]·x² + …`
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Parse a coefficient list written as `[a, b, c]` or `(a, b, c)`.
pub fn parse_coefficients(text: &str) -> Result<Vec<f64>, MonitorError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')))
        .ok_or_else(|| {
            MonitorError::NonLinear(format!(
                "COEFFICIENTS must be a list or tuple, got '{trimmed}'"
            ))
        })?;

    let mut out = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        // tolerate a trailing comma: "(1.0,)"
        if part.is_empty() {
            continue;
        }
        let value: f64 = part.parse().map_err(|_| {
            MonitorError::NonLinear(format!("COEFFICIENTS entry '{part}' is not a number"))
        })?;
        if !value.is_finite() {
            return Err(MonitorError::NonLinear(format!(
                "COEFFICIENTS entry '{part}' is not finite"
            )));
        }
        out.push(value);
    }
    if out.is_empty() {
        return Err(MonitorError::NonLinear(
            "COEFFICIENTS must contain at least one number".to_string(),
        ));
    }
    Ok(out)
}

pub struct NonLinearExtrusion<N, V> {
    next: N,
    toolhead: V,
    coefficients: Option<Vec<f64>>,
    enabled: bool,
}

impl<N: MoveTransform, V: ToolheadView> NonLinearExtrusion<N, V> {
    /// Disabled, without coefficients.
    pub fn new(next: N, toolhead: V) -> Self {
        Self {
            next,
            toolhead,
            coefficients: None,
            enabled: false,
        }
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    pub fn set_coefficients(&mut self, coefficients: Vec<f64>) {
        self.coefficients = Some(coefficients);
    }

    /// Enabling is refused until coefficients are set.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), MonitorError> {
        if enabled && self.coefficients.is_none() {
            return Err(MonitorError::NonLinear(
                "cannot enable without COEFFICIENTS".to_string(),
            ));
        }
        self.enabled = enabled;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn next_mut(&mut self) -> &mut N {
        &mut self.next
    }

    pub fn toolhead(&self) -> &V {
        &self.toolhead
    }

    /// Handle `ENABLE_NONLINEAR_EXTRUSION [ENABLE=0|1] [COEFFICIENTS=...]`.
    /// `ENABLE` defaults to 1 and any other value disables. Returns the
    /// console response.
    pub fn handle_command(
        &mut self,
        enable: Option<i64>,
        coefficients: Option<&str>,
    ) -> Result<String, MonitorError> {
        let enable = enable.unwrap_or(1) == 1;
        if let Some(text) = coefficients {
            let parsed = parse_coefficients(text)?;
            self.set_coefficients(parsed);
        }
        self.set_enabled(enable)?;
        Ok(match (&self.coefficients, enable) {
            (Some(c), true) => format!("Non-linear extrusion enabled with coefficients {c:?}"),
            _ => "Non-linear extrusion disabled".to_string(),
        })
    }

    fn can_apply(&self) -> bool {
        if self.coefficients.is_none() || !self.enabled {
            return false;
        }
        if self.toolhead.absolute_coordinates() && self.toolhead.absolute_extrusion() {
            return false;
        }
        self.toolhead.sensor_extruder_active()
    }

    /// The position and speed actually sent to the next stage.
    pub fn compensate(&self, mut newpos: [f64; 4], mut speed: f64) -> ([f64; 4], f64) {
        let Some(coefficients) = self.coefficients.as_deref().filter(|_| self.can_apply()) else {
            return (newpos, speed);
        };
        let oldpos = self.toolhead.commanded_position();
        let d: [f64; 4] = std::array::from_fn(|i| newpos[i] - oldpos[i]);
        let move_d = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        let extrude_only = move_d < EXTRUDE_ONLY_EPSILON;
        let extrude_d = d[3];
        if extrude_d > 0.0 {
            let (duration, e_speed) = if extrude_only {
                (extrude_d / speed, speed)
            } else {
                let duration = move_d / speed;
                (duration, extrude_d / duration)
            };
            let new_speed = polyval(coefficients, e_speed);
            newpos[3] = oldpos[3] + new_speed * duration;
            if extrude_only {
                speed = new_speed;
            }
        }
        (newpos, speed)
    }
}

impl<N: MoveTransform, V: ToolheadView> MoveTransform for NonLinearExtrusion<N, V> {
    fn move_to(
        &mut self,
        newpos: [f64; 4],
        speed: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (newpos, speed) = self.compensate(newpos, speed);
        self.next.move_to(newpos, speed)
    }

    fn position(&self) -> [f64; 4] {
        self.next.position()
    }
}
