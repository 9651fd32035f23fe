//! Register transports for the high-resolution filament sensor.
//!
//! Two interchangeable strategies implement `hrfs_traits::RegisterTransport`:
//! [`uart::SerialFrameTransport`] (bit-stuffed frames with CRC, per-field
//! retries) and [`block::BlockReadTransport`] (single 10-byte read).
pub mod block;
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod i2c;
pub mod sim;
pub mod uart;
pub mod util;

pub use block::BlockReadTransport;
pub use sim::SimulatedSensor;
pub use uart::{MarkerCheck, SerialFrameTransport};

/// Default I2C address of the sensor.
pub const DEFAULT_I2C_ADDRESS: u16 = 0x40;
/// Default I2C bus speed in Hz.
pub const DEFAULT_I2C_SPEED: u32 = 100_000;

/// Readable sensor registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    /// Block descriptor covering every field below.
    All = 0x10,
    MagnetState = 0x21,
    FilamentPresence = 0x22,
    FullTurns = 0x23,
    Angle = 0x24,
}

impl Register {
    #[inline]
    pub const fn addr(self) -> u8 {
        self as u8
    }

    /// Payload width in bytes.
    pub const fn width(self) -> usize {
        match self {
            Register::All => block::BLOCK_LEN,
            Register::MagnetState | Register::FilamentPresence => 1,
            Register::FullTurns | Register::Angle => 4,
        }
    }
}
