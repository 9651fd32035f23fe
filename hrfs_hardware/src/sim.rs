//! Simulated sensor that speaks both wire protocols.
//!
//! Clones share state, so one clone can be handed to a transport while
//! another drives the simulated filament.
use std::sync::{Arc, Mutex};

use hrfs_traits::{I2cBus, UartBus};

use crate::Register;
use crate::block::BLOCK_LEN;
use crate::uart::{BROADCAST_MARKER, FRAME_MARKER, READ_SYNC, add_serial_bits, crc8, remove_serial_bits};

/// Counts per revolution used when splitting the position into turns/angle.
pub const COUNTS_PER_TURN: i64 = (1 << 12) - 1;

#[derive(Debug)]
struct SimState {
    counts: i64,
    magnet_state: u8,
    filament_present: bool,
    connected: bool,
    corrupt_frames: u32,
    requests: u64,
}

#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

fn sim_error(msg: &str) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::other(msg.to_string()))
}

impl SimulatedSensor {
    /// Connected, magnet detected, filament present, at position 0.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                counts: 0,
                magnet_state: 4,
                filament_present: true,
                connected: true,
                corrupt_frames: 0,
                requests: 0,
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> Option<T> {
        self.state.lock().ok().map(|mut s| f(&mut s))
    }

    /// Turn the encoder by raw counts (negative reverses).
    pub fn rotate_counts(&self, counts: i64) {
        self.with_state(|s| s.counts += counts);
    }

    /// Move filament by `mm` given the wheel's `rotation_distance`.
    pub fn feed_mm(&self, mm: f64, rotation_distance: f64) {
        let counts = (mm / rotation_distance * COUNTS_PER_TURN as f64).round() as i64;
        self.rotate_counts(counts);
    }

    pub fn set_magnet_state(&self, state: u8) {
        self.with_state(|s| s.magnet_state = state);
    }

    pub fn set_filament_present(&self, present: bool) {
        self.with_state(|s| s.filament_present = present);
    }

    pub fn set_connected(&self, connected: bool) {
        self.with_state(|s| s.connected = connected);
    }

    /// Corrupt the payload of the next `n` UART replies without fixing the CRC.
    pub fn corrupt_next_frames(&self, n: u32) {
        self.with_state(|s| s.corrupt_frames = n);
    }

    /// Number of bus transactions served so far.
    pub fn requests(&self) -> u64 {
        self.with_state(|s| s.requests).unwrap_or(0)
    }

    fn turns_and_angle(counts: i64) -> (i32, i32) {
        (
            counts.div_euclid(COUNTS_PER_TURN) as i32,
            counts.rem_euclid(COUNTS_PER_TURN) as i32,
        )
    }

    fn payload(s: &SimState, reg: u8) -> Option<Vec<u8>> {
        let (turns, angle) = Self::turns_and_angle(s.counts);
        let v = match reg {
            r if r == Register::MagnetState.addr() => vec![s.magnet_state],
            r if r == Register::FilamentPresence.addr() => vec![u8::from(s.filament_present)],
            r if r == Register::FullTurns.addr() => turns.to_le_bytes().to_vec(),
            r if r == Register::Angle.addr() => angle.to_le_bytes().to_vec(),
            _ => return None,
        };
        Some(v)
    }
}

impl UartBus for SimulatedSensor {
    fn transfer(
        &mut self,
        request: &[u8],
        read_len: usize,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let mut guard = self.state.lock().map_err(|_| sim_error("sim state poisoned"))?;
        let s = &mut *guard;
        s.requests += 1;
        if !s.connected {
            return Err(sim_error("no response"));
        }
        let msg = remove_serial_bits(request);
        if msg.len() < 4 || msg[0] != READ_SYNC || msg[3] != crc8(&msg[..3]) {
            return Err(sim_error("malformed request"));
        }
        let reg = msg[2];
        let payload = Self::payload(s, reg).ok_or_else(|| sim_error("unknown register"))?;

        let mut frame = vec![FRAME_MARKER, BROADCAST_MARKER, reg];
        frame.extend_from_slice(&payload);
        frame.push(crc8(&frame));
        if s.corrupt_frames > 0 {
            s.corrupt_frames -= 1;
            frame[3] ^= 0x01;
        }
        let mut raw = add_serial_bits(&frame);
        raw.resize(read_len, 0);
        Ok(raw)
    }
}

impl I2cBus for SimulatedSensor {
    fn read_register(
        &mut self,
        reg: u8,
        len: usize,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let mut guard = self.state.lock().map_err(|_| sim_error("sim state poisoned"))?;
        let s = &mut *guard;
        s.requests += 1;
        if !s.connected {
            return Err(sim_error("i2c nack"));
        }
        if reg != Register::All.addr() {
            return Err(sim_error("unknown register"));
        }
        let (turns, angle) = Self::turns_and_angle(s.counts);
        let mut data = Vec::with_capacity(BLOCK_LEN);
        data.push(s.magnet_state);
        data.push(u8::from(s.filament_present));
        data.extend_from_slice(&turns.to_le_bytes());
        data.extend_from_slice(&angle.to_le_bytes());
        data.truncate(len);
        Ok(data)
    }
}
