#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and trace parsing for the filament motion sensor.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The trace CSV loader enforces headers and monotonic timestamps so a
//!   recorded session can be replayed deterministically.
use serde::Deserialize;

/// Number of bits the rotation encoder reports per revolution.
pub const RESOLUTION_BITS: u8 = 12;

/// Recorded sensor trace schema.
///
/// Expected headers:
/// time,commanded_epos,estimated_epos,magnet,presence,turns,angle
///
/// Example:
/// time,commanded_epos,estimated_epos,magnet,presence,turns,angle
/// 0.0,0.0,0.0,4,1,0,0
/// 0.1,1.0,0.8,4,1,0,142
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub time: f64,
    pub commanded_epos: f64,
    pub estimated_epos: f64,
    pub magnet: u8,
    pub presence: u8,
    pub turns: i32,
    pub angle: i32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorSection {
    /// Prefix for every console message.
    pub name: String,
    /// Extruder whose commanded moves are tracked.
    pub extruder: String,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            name: "filament_sensor".to_string(),
            extruder: "extruder".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MotionCfg {
    /// Millimetres of filament per wheel revolution
    pub rotation_distance: f64,
    #[serde(default)]
    pub invert_direction: bool,
    /// Low bits of the absolute position ignored as noise
    #[serde(default = "default_hysteresis_bits")]
    pub hysteresis_bits: u8,
}

const fn default_hysteresis_bits() -> u8 {
    3
}

#[derive(Debug, Deserialize)]
pub struct RunoutCfg {
    pub underextrusion_max_rate: f64,
    pub underextrusion_period: f64,
    #[serde(default = "default_move_evaluation_distance")]
    pub move_evaluation_distance: f64,
    #[serde(default = "default_true")]
    pub pause_on_runout: bool,
    #[serde(default)]
    pub runout_gcode: String,
    #[serde(default = "default_pause_delay")]
    pub pause_delay: f64,
    /// Quiet period after an alert before the next evaluation
    #[serde(default = "default_event_delay")]
    pub event_delay: f64,
}

const fn default_move_evaluation_distance() -> f64 {
    3.0
}

const fn default_true() -> bool {
    true
}

const fn default_pause_delay() -> f64 {
    0.5
}

const fn default_event_delay() -> f64 {
    3.0
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExtruderCfg {
    pub filament_diameter: f64,
}

impl Default for ExtruderCfg {
    fn default() -> Self {
        Self {
            filament_diameter: 1.75,
        }
    }
}

impl ExtruderCfg {
    /// Cross-section of the filament in mm².
    #[must_use]
    pub fn filament_area(&self) -> f64 {
        let r = self.filament_diameter / 2.0;
        std::f64::consts::PI * r * r
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct I2cCfg {
    pub address: u16,
    pub speed: u32,
    pub bus: u8,
    /// Attempts per block read before the sensor counts as disconnected
    pub attempts: u8,
}

impl Default for I2cCfg {
    fn default() -> Self {
        Self {
            address: 0x40,
            speed: 100_000,
            bus: 1,
            attempts: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UartCfg {
    pub rx_pin: String,
    pub tx_pin: String,
    #[serde(default)]
    pub address: u8,
    #[serde(default = "default_uart_retries")]
    pub retries: u8,
    /// Reject a reply when either marker byte is wrong instead of both
    #[serde(default)]
    pub strict_markers: bool,
}

const fn default_uart_retries() -> u8 {
    5
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Which register transport the config selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    I2c,
    Uart,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sensor: SensorSection,
    pub motion: MotionCfg,
    pub runout: RunoutCfg,
    #[serde(default)]
    pub extruder: ExtruderCfg,
    #[serde(default)]
    pub i2c: I2cCfg,
    /// Present only when the sensor is wired over single-wire UART
    #[serde(default)]
    pub uart: Option<UartCfg>,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    #[must_use]
    pub const fn transport_kind(&self) -> TransportKind {
        if self.uart.is_some() {
            TransportKind::Uart
        } else {
            TransportKind::I2c
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        if self.sensor.name.trim().is_empty() {
            eyre::bail!("sensor.name must not be empty");
        }

        // Motion
        let rd = self.motion.rotation_distance;
        if !rd.is_finite() || rd <= 0.0 {
            eyre::bail!("motion.rotation_distance must be > 0");
        }
        if self.motion.hysteresis_bits >= RESOLUTION_BITS {
            eyre::bail!(
                "motion.hysteresis_bits must be in [0, {}]",
                RESOLUTION_BITS - 1
            );
        }

        // Runout
        let rate = self.runout.underextrusion_max_rate;
        if !(0.0..=1.0).contains(&rate) {
            eyre::bail!("runout.underextrusion_max_rate must be in [0.0, 1.0]");
        }
        if !(self.runout.underextrusion_period >= 0.0) {
            eyre::bail!("runout.underextrusion_period must be >= 0");
        }
        if !(self.runout.move_evaluation_distance >= 0.0) {
            eyre::bail!("runout.move_evaluation_distance must be >= 0");
        }
        if !(self.runout.pause_delay >= 0.0) {
            eyre::bail!("runout.pause_delay must be >= 0");
        }
        if !(self.runout.event_delay >= 0.0) {
            eyre::bail!("runout.event_delay must be >= 0");
        }

        // Extruder
        let d = self.extruder.filament_diameter;
        if !d.is_finite() || d <= 0.0 {
            eyre::bail!("extruder.filament_diameter must be > 0");
        }

        // Transports
        if self.i2c.attempts == 0 {
            eyre::bail!("i2c.attempts must be >= 1");
        }
        if self.i2c.speed == 0 {
            eyre::bail!("i2c.speed must be > 0");
        }
        if let Some(uart) = &self.uart {
            if uart.retries == 0 {
                eyre::bail!("uart.retries must be >= 1");
            }
            if uart.rx_pin.trim().is_empty() || uart.tx_pin.trim().is_empty() {
                eyre::bail!("uart.rx_pin and uart.tx_pin must not be empty");
            }
            if pin_chip(&uart.rx_pin) != pin_chip(&uart.tx_pin) {
                eyre::bail!("uart.rx_pin and uart.tx_pin must be on the same mcu");
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}

/// MCU a pin belongs to: `"mcu:PA1"` -> `"mcu"`, bare pins live on `"mcu"`.
fn pin_chip(pin: &str) -> &str {
    let pin = pin.trim().trim_start_matches(['^', '~', '!']);
    pin.split_once(':').map_or("mcu", |(chip, _)| chip.trim())
}

/// Parse a trace from any reader; see [`TraceRow`] for the schema.
pub fn parse_trace<R: std::io::Read>(reader: R) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read trace CSV headers: {}", e))?
        .clone();
    let expected = [
        "time",
        "commanded_epos",
        "estimated_epos",
        "magnet",
        "presence",
        "turns",
        "angle",
    ];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers '{}', got: {}",
            expected.join(","),
            actual.join(",")
        );
    }

    let mut rows: Vec<TraceRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if !row.time.is_finite() {
            eyre::bail!("trace row {} has a non-finite time", idx + 2);
        }
        if let Some(prev) = rows.last()
            && row.time < prev.time
        {
            eyre::bail!(
                "trace time must be non-decreasing (row {}: {} < {})",
                idx + 2,
                row.time,
                prev.time
            );
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("trace CSV has no rows");
    }
    Ok(rows)
}

pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;
    parse_trace(file)
}
