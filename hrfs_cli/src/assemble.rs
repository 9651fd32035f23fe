//! Config mapping and hardware assembly shared by the subcommands.

use std::path::Path;

use eyre::{Result, WrapErr};
use hrfs_config::{Config, TransportKind};
use hrfs_core::{FilamentMonitor, RunoutCfg, SensorCfg};
use hrfs_hardware::{BlockReadTransport, MarkerCheck, SerialFrameTransport, SimulatedSensor};
use hrfs_traits::{AlertSink, Clock, ExtruderHost, RegisterTransport};

pub type BoxedTransport = Box<dyn RegisterTransport + Send>;

/// Read, parse and validate the TOML config.
pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    let cfg = hrfs_config::load_toml(&text)
        .wrap_err_with(|| format!("failed to parse config {}", path.display()))?;
    cfg.validate()
        .wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// The configured transport talking to `sensor` through the real wire codec.
pub fn sim_transport(cfg: &Config, sensor: SimulatedSensor) -> BoxedTransport {
    match (cfg.transport_kind(), cfg.uart.as_ref()) {
        (TransportKind::Uart, Some(uart)) => {
            let markers = if uart.strict_markers {
                MarkerCheck::Strict
            } else {
                MarkerCheck::Lenient
            };
            Box::new(
                SerialFrameTransport::new(sensor, uart.address)
                    .with_retries(uart.retries)
                    .with_marker_check(markers),
            )
        }
        _ => Box::new(BlockReadTransport::new(sensor).with_attempts(cfg.i2c.attempts)),
    }
}

/// Transport to the physical sensor when built with `hardware`, otherwise a
/// simulated sensor at rest.
pub fn open_transport(cfg: &Config) -> Result<BoxedTransport> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        if cfg.transport_kind() == TransportKind::Uart {
            eyre::bail!(
                "the uart transport is bit-banged by the printer mcu and cannot be opened from here"
            );
        }
        let bus = hrfs_hardware::i2c::RppalI2c::open(cfg.i2c.bus, cfg.i2c.address, cfg.i2c.speed)
            .wrap_err("open i2c sensor")?;
        tracing::info!(bus = cfg.i2c.bus, address = cfg.i2c.address, "using i2c sensor");
        Ok(Box::new(
            BlockReadTransport::new(bus).with_attempts(cfg.i2c.attempts),
        ))
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        tracing::info!(transport = ?cfg.transport_kind(), "using simulated sensor");
        Ok(sim_transport(cfg, SimulatedSensor::new()))
    }
}

/// Build a monitor from the config and the given collaborators.
pub fn build_monitor(
    cfg: &Config,
    transport: BoxedTransport,
    host: impl ExtruderHost + Send + 'static,
    alerts: impl AlertSink + Send + 'static,
    clock: impl Clock + Send + Sync + 'static,
) -> Result<FilamentMonitor> {
    let sensor = SensorCfg::from(cfg);
    let runout = RunoutCfg::from(&cfg.runout);
    FilamentMonitor::builder()
        .with_transport(transport)
        .with_host(host)
        .with_alerts(alerts)
        .with_clock(clock)
        .with_sensor(sensor)
        .with_runout(runout)
        .build()
}
