//! I2C bus on Linux single-board computers via `rppal`.
use hrfs_traits::I2cBus;
use rppal::i2c::I2c;
use tracing::debug;

use crate::error::{HwError, Result};

pub struct RppalI2c {
    i2c: I2c,
}

impl RppalI2c {
    /// Open `/dev/i2c-<bus>` and address the sensor at `address`.
    ///
    /// The bus clock is fixed by the kernel/device tree; `speed_hz` is only
    /// compared against it and logged.
    pub fn open(bus: u8, address: u16, speed_hz: u32) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::Bus(format!("open i2c-{bus}: {e}")))?;
        i2c.set_slave_address(address)
            .map_err(|e| HwError::Bus(format!("set address {address:#04x}: {e}")))?;
        if let Ok(actual) = i2c.clock_speed() {
            debug!(bus, address, requested_hz = speed_hz, actual_hz = actual, "i2c opened");
        }
        Ok(Self { i2c })
    }
}

impl I2cBus for RppalI2c {
    fn read_register(
        &mut self,
        reg: u8,
        len: usize,
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let mut buf = vec![0u8; len];
        self.i2c.write_read(&[reg], &mut buf)?;
        Ok(buf)
    }
}
