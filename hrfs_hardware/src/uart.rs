//! Serial-frame register protocol.
//!
//! Requests and replies travel over a bit-banged single-wire UART where every
//! byte occupies 10 bits on the wire: a start bit (0), eight data bits LSB
//! first, and a stop bit (1). The bus hands us the raw bit stream, so framing
//! is added and removed here. A reply frame is
//! `[FRAME_MARKER, BROADCAST_MARKER, reg, payload.., crc8]`.
use hrfs_traits::{RawReading, RegisterTransport, UartBus};
use tracing::warn;

use crate::Register;
use crate::error::{HwError, Result};
use crate::util::{hex, retry};

/// Sync byte opening a read request.
pub const READ_SYNC: u8 = 0xF5;
/// First byte of every reply.
pub const FRAME_MARKER: u8 = 0x05;
/// Second byte of every reply (replies are addressed to the bus master).
pub const BROADCAST_MARKER: u8 = 0xFF;
/// Smallest valid reply: markers, register, one payload byte, CRC.
pub const MIN_FRAME_LEN: usize = 5;
/// Per-field attempts before a register read gives up.
pub const DEFAULT_RETRIES: u8 = 5;

/// How strictly the two leading reply markers are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerCheck {
    /// Reject only when *both* markers are wrong. This is how deployed
    /// firmware hosts have always behaved, so it stays the default.
    #[default]
    Lenient,
    /// Reject when either marker is wrong.
    Strict,
}

impl MarkerCheck {
    fn rejects(self, frame_marker: u8, broadcast_marker: u8) -> bool {
        let bad_frame = frame_marker != FRAME_MARKER;
        let bad_broadcast = broadcast_marker != BROADCAST_MARKER;
        match self {
            MarkerCheck::Lenient => bad_frame && bad_broadcast,
            MarkerCheck::Strict => bad_frame || bad_broadcast,
        }
    }
}

/// CRC-8 (polynomial 0x07), feeding each byte least-significant bit first.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            if ((crc >> 7) ^ (b & 0x01)) != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
            b >>= 1;
        }
    }
    crc
}

/// Wrap each byte in start/stop bits and pack the result LSB first.
pub fn add_serial_bits(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; (data.len() * 10).div_ceil(8)];
    for (i, &d) in data.iter().enumerate() {
        let word = (u16::from(d) << 1) | 0x200;
        for bit in 0..10 {
            if (word >> bit) & 1 == 1 {
                let pos = i * 10 + bit;
                out[pos / 8] |= 1 << (pos % 8);
            }
        }
    }
    out
}

/// Inverse of [`add_serial_bits`]: treat `data` as one LSB-first bit stream
/// and take 8 bits at offset `10 * i + 1` for every complete 10-bit slot.
pub fn remove_serial_bits(data: &[u8]) -> Vec<u8> {
    let bit = |pos: usize| -> u8 { data.get(pos / 8).map_or(0, |b| (b >> (pos % 8)) & 1) };
    (0..(data.len() * 8) / 10)
        .map(|i| {
            let shift = i * 10 + 1;
            (0..8).fold(0u8, |acc, k| acc | (bit(shift + k) << k))
        })
        .collect()
}

/// Build the on-wire read request for `reg` on the sensor at `addr`.
pub fn encode_read(addr: u8, reg: u8) -> Vec<u8> {
    let mut msg = vec![READ_SYNC, addr, reg];
    msg.push(crc8(&msg));
    add_serial_bits(&msg)
}

/// Number of raw bytes to clock in for a reply carrying `reg_len` payload bytes.
#[inline]
pub const fn reply_len(reg_len: usize) -> usize {
    ((4 + reg_len) * 10).div_ceil(8)
}

/// Unstuff and verify a reply to a read of `reg`, returning its payload.
pub fn decode_read(reg: u8, data: &[u8], markers: MarkerCheck) -> Result<Vec<u8>> {
    let decoded = remove_serial_bits(data);
    if decoded.len() < MIN_FRAME_LEN {
        return Err(HwError::ShortFrame(decoded.len()));
    }
    let (crc, body) = match decoded.split_last() {
        Some((crc, body)) => (*crc, body),
        None => return Err(HwError::ShortFrame(0)),
    };
    let expected = crc8(body);
    if crc != expected {
        return Err(HwError::CrcMismatch {
            expected,
            actual: crc,
        });
    }
    if markers.rejects(body[0], body[1]) {
        let raw = hex(&decoded);
        warn!(frame = %raw, "received wrong message prefix");
        return Err(HwError::BadPrefix(raw));
    }
    if body[2] != reg {
        warn!(
            got = format_args!("{:02x}", body[2]),
            expected = format_args!("{reg:02x}"),
            "received response for wrong register"
        );
        return Err(HwError::RegisterMismatch {
            expected: reg,
            actual: body[2],
        });
    }
    Ok(body[3..].to_vec())
}

/// Register transport over a bit-banged UART: four independent register
/// reads per sample, each retried on its own.
pub struct SerialFrameTransport<B: UartBus> {
    bus: B,
    addr: u8,
    retries: u8,
    markers: MarkerCheck,
}

impl<B: UartBus> SerialFrameTransport<B> {
    pub fn new(bus: B, addr: u8) -> Self {
        Self {
            bus,
            addr,
            retries: DEFAULT_RETRIES,
            markers: MarkerCheck::default(),
        }
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_marker_check(mut self, markers: MarkerCheck) -> Self {
        self.markers = markers;
        self
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Single attempt at reading `len` bytes from `reg`.
    pub fn reg_read(&mut self, reg: u8, len: usize) -> Result<Vec<u8>> {
        let request = encode_read(self.addr, reg);
        let raw = self
            .bus
            .transfer(&request, reply_len(len))
            .map_err(|e| HwError::Bus(e.to_string()))?;
        decode_read(reg, &raw, self.markers)
    }

    fn read_with_retries(&mut self, reg: Register) -> Result<Vec<u8>> {
        let (addr, len) = (reg.addr(), reg.width());
        let res = retry(self.retries, || {
            let payload = self.reg_read(addr, len)?;
            if payload.len() == len {
                Ok(payload)
            } else {
                Err(HwError::ShortFrame(payload.len()))
            }
        });
        if let Err(e) = &res {
            warn!(reg = ?reg, error = %e, "error reading from uart, no response received or CRC was invalid");
        }
        res
    }

    /// Unsigned single-byte register.
    pub fn read_reg1(&mut self, reg: Register) -> Result<u8> {
        let data = self.read_with_retries(reg)?;
        Ok(data[0])
    }

    /// Signed little-endian 32-bit register.
    pub fn read_reg4(&mut self, reg: Register) -> Result<i32> {
        let data = self.read_with_retries(reg)?;
        let bytes: [u8; 4] = data
            .as_slice()
            .try_into()
            .map_err(|_| HwError::ShortFrame(data.len()))?;
        Ok(i32::from_le_bytes(bytes))
    }
}

impl<B: UartBus> RegisterTransport for SerialFrameTransport<B> {
    fn read_registers(&mut self) -> std::result::Result<RawReading, Box<dyn std::error::Error + Send + Sync>> {
        // Every field is attempted even if an earlier one failed so the bus
        // sees the same traffic pattern on each tick.
        let magnet_state = self.read_reg1(Register::MagnetState);
        let filament_presence = self.read_reg1(Register::FilamentPresence);
        let full_turns = self.read_reg4(Register::FullTurns);
        let angle = self.read_reg4(Register::Angle);
        Ok(RawReading {
            magnet_state: magnet_state?,
            filament_presence: filament_presence?,
            full_turns: full_turns?,
            angle: angle?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(reg: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![FRAME_MARKER, BROADCAST_MARKER, reg];
        frame.extend_from_slice(payload);
        frame.push(crc8(&frame));
        add_serial_bits(&frame)
    }

    #[test]
    fn crc8_known_vectors() {
        assert_eq!(crc8(&[]), 0);
        assert_eq!(crc8(&[0x01]), 0x89);
        assert_eq!(crc8(&[READ_SYNC, 0x00, 0x24]), 0xf3);
        assert_eq!(crc8(&[0x05, 0xff, 0x21, 0x04]), 0xd6);
        assert_ne!(crc8(&[0x05, 0xff, 0x21, 0x04]), crc8(&[0x05, 0xff, 0x21, 0x05]));
    }

    #[test]
    fn stuffing_places_start_and_stop_bits() {
        let stuffed = add_serial_bits(&[0xff]);
        // bit0 start=0, bits1..8 data=1, bit9 stop=1
        assert_eq!(stuffed, vec![0xfe, 0x03]);
        assert_eq!(remove_serial_bits(&stuffed), vec![0xff]);
    }

    #[test]
    fn request_is_four_stuffed_bytes() {
        let req = encode_read(0, Register::Angle.addr());
        assert_eq!(req.len(), 5);
        let msg = remove_serial_bits(&req);
        assert_eq!(&msg[..3], &[READ_SYNC, 0, 0x24]);
        assert_eq!(msg[3], crc8(&msg[..3]));
    }

    #[test]
    fn reply_len_matches_frame_sizes() {
        assert_eq!(reply_len(1), 7);
        assert_eq!(reply_len(4), 10);
    }

    #[test]
    fn decodes_payload_of_valid_reply() {
        let raw = reply(0x23, &[0x10, 0x00, 0x00, 0x80]);
        let payload = decode_read(0x23, &raw, MarkerCheck::Lenient).unwrap();
        assert_eq!(payload, vec![0x10, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn short_frames_are_rejected() {
        let raw = add_serial_bits(&[0x05, 0xff, 0x21]);
        assert!(matches!(
            decode_read(0x21, &raw, MarkerCheck::Lenient),
            Err(HwError::ShortFrame(_))
        ));
    }

    #[test]
    fn marker_check_policies_differ_on_single_mismatch() {
        let mut frame = vec![0x06, BROADCAST_MARKER, 0x21, 0x04];
        frame.push(crc8(&frame));
        let raw = add_serial_bits(&frame);
        assert!(decode_read(0x21, &raw, MarkerCheck::Lenient).is_ok());
        assert!(matches!(
            decode_read(0x21, &raw, MarkerCheck::Strict),
            Err(HwError::BadPrefix(_))
        ));

        let mut frame = vec![0x06, 0x00, 0x21, 0x04];
        frame.push(crc8(&frame));
        let raw = add_serial_bits(&frame);
        assert!(matches!(
            decode_read(0x21, &raw, MarkerCheck::Lenient),
            Err(HwError::BadPrefix(_))
        ));
    }
}
