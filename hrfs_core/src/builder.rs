//! Type-state builder for `FilamentMonitor`.
//!
//! The builder enforces at compile time that a register transport, an
//! extruder host and an alert sink are provided before `build()` is
//! available. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use hrfs_traits::{AlertSink, Clock, ExtruderHost, MonotonicClock, RegisterTransport};

use crate::config::{RESOLUTION_BITS, RunoutCfg, SensorCfg};
use crate::error::{BuildError, Result};
use crate::monitor::FilamentMonitor;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `FilamentMonitor`. All fields are validated on `build()`.
pub struct MonitorBuilder<T, H, A> {
    transport: Option<Box<dyn RegisterTransport + Send>>,
    host: Option<Box<dyn ExtruderHost + Send>>,
    alerts: Option<Box<dyn AlertSink + Send>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    sensor: Option<SensorCfg>,
    runout: Option<RunoutCfg>,
    _t: PhantomData<T>,
    _h: PhantomData<H>,
    _a: PhantomData<A>,
}

impl Default for MonitorBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            transport: None,
            host: None,
            alerts: None,
            clock: None,
            sensor: None,
            runout: None,
            _t: PhantomData,
            _h: PhantomData,
            _a: PhantomData,
        }
    }
}

impl FilamentMonitor {
    /// Start building a monitor.
    pub fn builder() -> MonitorBuilder<Missing, Missing, Missing> {
        MonitorBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(sensor: &SensorCfg, runout: &RunoutCfg) -> Result<()> {
    if sensor.hysteresis_bits >= RESOLUTION_BITS {
        return Err(invalid("hysteresis_bits must be below the 12 resolution bits"));
    }
    if !(sensor.rotation_distance.is_finite() && sensor.rotation_distance > 0.0) {
        return Err(invalid("rotation_distance must be > 0"));
    }
    if !(0.0..=1.0).contains(&runout.underextrusion_max_rate) {
        return Err(invalid("underextrusion_max_rate must be in [0, 1]"));
    }
    if !(runout.underextrusion_period >= 0.0) {
        return Err(invalid("underextrusion_period must be >= 0"));
    }
    if !(runout.move_evaluation_distance >= 0.0) {
        return Err(invalid("move_evaluation_distance must be >= 0"));
    }
    if !(runout.pause_delay >= 0.0 && runout.event_delay >= 0.0) {
        return Err(invalid("pause_delay and event_delay must be >= 0"));
    }
    Ok(())
}

impl<T, H, A> MonitorBuilder<T, H, A> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<FilamentMonitor> {
        let transport = self
            .transport
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTransport))?;
        let host = self
            .host
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHost))?;
        let alerts = self
            .alerts
            .ok_or_else(|| eyre::Report::new(BuildError::MissingAlertSink))?;
        let sensor = self.sensor.unwrap_or_default();
        let runout = self.runout.unwrap_or_default();
        validate(&sensor, &runout)?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        Ok(FilamentMonitor::from_parts(
            sensor, runout, transport, host, alerts, clock,
        ))
    }
}

/// Chainable setters that do not affect type-state.
impl<T, H, A> MonitorBuilder<T, H, A> {
    pub fn with_sensor(mut self, sensor: SensorCfg) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_runout(mut self, runout: RunoutCfg) -> Self {
        self.runout = Some(runout);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }
}

// Setters that advance type-state
impl<H, A> MonitorBuilder<Missing, H, A> {
    pub fn with_transport(
        self,
        transport: impl RegisterTransport + Send + 'static,
    ) -> MonitorBuilder<Set, H, A> {
        MonitorBuilder {
            transport: Some(Box::new(transport)),
            host: self.host,
            alerts: self.alerts,
            clock: self.clock,
            sensor: self.sensor,
            runout: self.runout,
            _t: PhantomData,
            _h: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<T, A> MonitorBuilder<T, Missing, A> {
    pub fn with_host(self, host: impl ExtruderHost + Send + 'static) -> MonitorBuilder<T, Set, A> {
        MonitorBuilder {
            transport: self.transport,
            host: Some(Box::new(host)),
            alerts: self.alerts,
            clock: self.clock,
            sensor: self.sensor,
            runout: self.runout,
            _t: PhantomData,
            _h: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<T, H> MonitorBuilder<T, H, Missing> {
    pub fn with_alerts(self, alerts: impl AlertSink + Send + 'static) -> MonitorBuilder<T, H, Set> {
        MonitorBuilder {
            transport: self.transport,
            host: self.host,
            alerts: Some(Box::new(alerts)),
            clock: self.clock,
            sensor: self.sensor,
            runout: self.runout,
            _t: PhantomData,
            _h: PhantomData,
            _a: PhantomData,
        }
    }
}

impl MonitorBuilder<Set, Set, Set> {
    /// Validate and build the monitor. Only available when transport, host and alert sink are set.
    pub fn build(self) -> Result<FilamentMonitor> {
        self.try_build()
    }
}
