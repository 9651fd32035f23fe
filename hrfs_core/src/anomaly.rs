//! Health, runout and under-extrusion detection.
//!
//! `AnomalyEngine` owns the alert flags and the under-extrusion timer. It is
//! pure with respect to I/O: each evaluation returns the transitions that
//! happened and whether the runout action has to fire, and the caller turns
//! those into console messages and host actions.
use std::fmt;

use crate::edge::EdgeTrigger;
use crate::moves::CommandedMove;

/// Magnet field strength as reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnetState {
    NotDetected,
    TooWeak,
    TooStrong,
    Detected,
    Unknown(u8),
}

// Before the first successful read.
impl Default for MagnetState {
    fn default() -> Self {
        Self::Unknown(0xFF)
    }
}

impl From<u8> for MagnetState {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::NotDetected,
            2 => Self::TooWeak,
            3 => Self::TooStrong,
            4 => Self::Detected,
            other => Self::Unknown(other),
        }
    }
}

impl MagnetState {
    pub const fn is_detected(self) -> bool {
        matches!(self, Self::Detected)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotDetected => "not detected",
            Self::TooWeak => "too weak",
            Self::TooStrong => "too strong",
            Self::Detected => "detected",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for MagnetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensor state the engine judges health and runout from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub connected: bool,
    pub magnet: MagnetState,
    pub filament_present: bool,
}

impl Health {
    /// Why the sensor cannot be trusted, if it cannot.
    pub fn fault(&self) -> Option<String> {
        if !self.connected {
            Some("no data from sensor".to_string())
        } else if !self.magnet.is_detected() {
            Some(format!("magnet {}", self.magnet))
        } else {
            None
        }
    }
}

/// Transitions produced by an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnomalyEvent {
    Unhealthy { reason: String },
    Healthy,
    /// The rate went above the maximum and the timer started.
    UnderextrusionSuspected { rate: f64 },
    /// The rate stayed above the maximum for longer than `period`.
    UnderextrusionDetected { period: f64 },
    /// `after` is the time since the timer started; `None` when cleared by
    /// a reset.
    UnderextrusionCleared { after: Option<f64> },
    RunoutDetected,
    RunoutCleared,
}

/// Result of one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub events: Vec<AnomalyEvent>,
    /// Rising edge of unhealthy or runout: the runout action must run.
    pub fire_runout: bool,
}

/// `1 - extrusion_rate`, clamped to [-1, 1]; 0 without a move.
pub fn underextrusion_rate(eval_move: Option<&CommandedMove>) -> f64 {
    eval_move.map_or(0.0, |m| (1.0 - m.extrusion_rate()).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone)]
pub struct AnomalyEngine {
    max_rate: f64,
    period: f64,
    unhealthy: EdgeTrigger,
    runout: EdgeTrigger,
    underextruding: EdgeTrigger,
    underextrusion_start: Option<f64>,
}

impl AnomalyEngine {
    pub fn new(max_rate: f64, period: f64) -> Self {
        Self {
            max_rate,
            period,
            unhealthy: EdgeTrigger::with_value(false),
            runout: EdgeTrigger::with_value(false),
            underextruding: EdgeTrigger::with_value(false),
            underextrusion_start: None,
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.unhealthy.is_true()
    }

    pub fn is_runout(&self) -> bool {
        self.runout.is_true()
    }

    pub fn is_underextruding(&self) -> bool {
        self.underextruding.is_true()
    }

    /// When the rate first exceeded the maximum, if it still does.
    pub fn underextrusion_start(&self) -> Option<f64> {
        self.underextrusion_start
    }

    /// Forget runout and under-extrusion state at the start of a print.
    pub fn reset(&mut self) -> Vec<AnomalyEvent> {
        let mut events = Vec::new();
        if self.runout.set_logged("runout", false).is_some() {
            events.push(AnomalyEvent::RunoutCleared);
        }
        self.underextrusion_start = None;
        if self.underextruding.set_logged("underextruding", false).is_some() {
            events.push(AnomalyEvent::UnderextrusionCleared { after: None });
        }
        events
    }

    /// Judge health first, then runout. Health problems take priority and
    /// skip the runout check entirely.
    pub fn evaluate(
        &mut self,
        now: f64,
        health: Health,
        eval_move: Option<&CommandedMove>,
    ) -> Evaluation {
        let mut out = Evaluation::default();

        if let Some(reason) = health.fault() {
            if self.unhealthy.set_logged("unhealthy", true).is_some() {
                out.events.push(AnomalyEvent::Unhealthy { reason });
                out.fire_runout = true;
            }
            return out;
        }
        if self.unhealthy.set_logged("unhealthy", false).is_some() {
            out.events.push(AnomalyEvent::Healthy);
        }

        if self.runout_condition(now, health, eval_move, &mut out.events) {
            if self.runout.set_logged("runout", true).is_some() {
                out.events.push(AnomalyEvent::RunoutDetected);
                out.fire_runout = true;
            }
            return out;
        }
        if self.runout.set_logged("runout", false).is_some() {
            out.events.push(AnomalyEvent::RunoutCleared);
        }
        out
    }

    fn runout_condition(
        &mut self,
        now: f64,
        health: Health,
        eval_move: Option<&CommandedMove>,
        events: &mut Vec<AnomalyEvent>,
    ) -> bool {
        if !health.filament_present {
            return true;
        }

        let rate = underextrusion_rate(eval_move);
        if rate > self.max_rate {
            let Some(start) = self.underextrusion_start else {
                self.underextrusion_start = Some(now);
                events.push(AnomalyEvent::UnderextrusionSuspected { rate });
                return false;
            };
            if start + self.period < now {
                if self.underextruding.set_logged("underextruding", true).is_some() {
                    events.push(AnomalyEvent::UnderextrusionDetected {
                        period: self.period,
                    });
                }
                return true;
            }
        } else if let Some(start) = self.underextrusion_start.take() {
            if self.underextruding.set_logged("underextruding", false).is_some() {
                events.push(AnomalyEvent::UnderextrusionCleared {
                    after: Some(now - start),
                });
            }
        }
        false
    }
}
