//! Block-read register protocol: one 10-byte transaction per sample.
use hrfs_traits::{I2cBus, RawReading, RegisterTransport};
use tracing::{debug, warn};

use crate::Register;
use crate::error::{HwError, Result};
use crate::util::{hex, retry};

/// Size of the `ALL` register block.
pub const BLOCK_LEN: usize = 10;
/// Magnet-state byte of a block read from a sensor that is not answering.
pub const DISCONNECTED_MAGNET: u8 = 0xFF;

/// Parse `{u8 magnet, u8 presence, i32 turns LE, i32 angle LE}`.
pub fn parse_block(data: &[u8]) -> Result<RawReading> {
    if data.len() != BLOCK_LEN {
        return Err(HwError::ShortBlock {
            expected: BLOCK_LEN,
            actual: data.len(),
            raw: hex(data),
        });
    }
    let le = |at: usize| i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    Ok(RawReading {
        magnet_state: data[0],
        filament_presence: data[1],
        full_turns: le(2),
        angle: le(6),
    })
}

/// Register transport reading the whole register file at once.
///
/// A short or garbled block invalidates the sample, as does a magnet state
/// of [`DISCONNECTED_MAGNET`]; by default there is exactly one attempt per
/// sample.
pub struct BlockReadTransport<B: I2cBus> {
    bus: B,
    attempts: u8,
}

impl<B: I2cBus> BlockReadTransport<B> {
    pub fn new(bus: B) -> Self {
        Self { bus, attempts: 1 }
    }

    pub fn with_attempts(mut self, attempts: u8) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn read_block(&mut self) -> Result<RawReading> {
        let data = self
            .bus
            .read_register(Register::All.addr(), BLOCK_LEN)
            .map_err(|e| {
                warn!(error = %e, "unable to read");
                HwError::Bus(e.to_string())
            })?;
        let reading = parse_block(&data).inspect_err(|e| {
            warn!(error = %e, "update from sensor failed");
        })?;
        if reading.magnet_state == DISCONNECTED_MAGNET {
            debug!(raw = %hex(&data), "sensor reports disconnected");
            return Err(HwError::NoResponse);
        }
        Ok(reading)
    }
}

impl<B: I2cBus> RegisterTransport for BlockReadTransport<B> {
    fn read_registers(&mut self) -> std::result::Result<RawReading, Box<dyn std::error::Error + Send + Sync>> {
        let attempts = self.attempts;
        Ok(retry(attempts, || self.read_block())?)
    }
}
