//! Seams between the filament sensor core and everything it does not own:
//! the register bus, the host's extruder/toolhead state, the alert console
//! and the motion pipeline.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// One complete raw sample from the sensor's register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawReading {
    /// 1 = not detected, 2 = too weak, 3 = too strong, 4 = detected. A block
    /// read answering 0xFF never gets this far; it reads as disconnected.
    pub magnet_state: u8,
    /// 1 when filament is present.
    pub filament_presence: u8,
    pub full_turns: i32,
    /// Raw 12-bit angle including the low hysteresis bits.
    pub angle: i32,
}

/// Byte-level exchange with a bit-banged single-wire UART.
///
/// `request` already carries start/stop bits; the returned buffer is the raw
/// `read_len` bytes of the reply, still bit-stuffed.
pub trait UartBus {
    fn transfer(
        &mut self,
        request: &[u8],
        read_len: usize,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Register read over an I2C-style bus.
pub trait I2cBus {
    fn read_register(
        &mut self,
        reg: u8,
        len: usize,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Source of complete sensor readings, whatever the wire protocol.
pub trait RegisterTransport {
    fn read_registers(&mut self) -> Result<RawReading, Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for Box<T> {
    fn read_registers(&mut self) -> Result<RawReading, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_registers()
    }
}

/// The host's view of the extruder this sensor is attached to.
pub trait ExtruderHost {
    /// Commanded position of the extruder axis, or `None` while a different
    /// extruder is active on the toolhead.
    fn commanded_position(&self) -> Option<f64>;
    /// Estimated physical extruder position at `eventtime`.
    fn estimated_position(&self, eventtime: f64) -> f64;
    /// Filament cross-section in mm².
    fn filament_area(&self) -> f64;
}

impl<T: ExtruderHost + ?Sized> ExtruderHost for Box<T> {
    fn commanded_position(&self) -> Option<f64> {
        (**self).commanded_position()
    }
    fn estimated_position(&self, eventtime: f64) -> f64 {
        (**self).estimated_position(eventtime)
    }
    fn filament_area(&self) -> f64 {
        (**self).filament_area()
    }
}

/// What to do when a runout-family alert fires.
#[derive(Debug, Clone, PartialEq)]
pub struct RunoutAction {
    pub eventtime: f64,
    /// Pause the print before running `script`.
    pub pause: bool,
    /// Earliest time the host should resume processing after pausing.
    pub pause_until: f64,
    /// G-code to run; ends with `M400`.
    pub script: String,
}

/// Host console and pause/resume orchestration.
pub trait AlertSink {
    fn respond_info(&mut self, msg: &str);
    fn respond_error(&mut self, msg: &str);
    fn runout(&mut self, action: &RunoutAction)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: AlertSink + ?Sized> AlertSink for Box<T> {
    fn respond_info(&mut self, msg: &str) {
        (**self).respond_info(msg);
    }
    fn respond_error(&mut self, msg: &str) {
        (**self).respond_error(msg);
    }
    fn runout(
        &mut self,
        action: &RunoutAction,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).runout(action)
    }
}

/// Next stage of the host's motion pipeline (x, y, z, e).
pub trait MoveTransform {
    fn move_to(
        &mut self,
        newpos: [f64; 4],
        speed: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn position(&self) -> [f64; 4];
}

/// Toolhead and G-code state consulted by move intercepts.
pub trait ToolheadView {
    /// Last commanded toolhead position (x, y, z, e).
    fn commanded_position(&self) -> [f64; 4];
    fn absolute_coordinates(&self) -> bool;
    fn absolute_extrusion(&self) -> bool;
    /// True when the active extruder is the one this sensor watches.
    fn sensor_extruder_active(&self) -> bool;
}
