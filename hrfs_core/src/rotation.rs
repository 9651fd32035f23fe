//! Absolute rotation decoding.
//!
//! The encoder reports a signed turn count plus a 12-bit angle. The two are
//! folded into one absolute count, the low `ignore_bits` are masked off as
//! hysteresis, and the result is expressed in degrees.

/// Folds turns and angle into absolute degrees with low-bit hysteresis.
#[derive(Debug, Clone)]
pub struct RotationDecoder {
    resolution_bits: u32,
    ignore_bits: u32,
    max_value: i64,
    mask: i64,
    raw: i64,
}

impl RotationDecoder {
    /// `ignore_bits` must be below `resolution_bits`; config validation
    /// rejects anything else.
    pub fn new(resolution_bits: u32, ignore_bits: u32) -> Self {
        Self {
            resolution_bits,
            ignore_bits,
            max_value: (1_i64 << resolution_bits) - 1,
            mask: (1_i64 << ignore_bits) - 1,
            raw: 0,
        }
    }

    /// Latch a new raw reading.
    pub fn update(&mut self, full_turns: i32, angle: i32) {
        self.raw = i64::from(full_turns) * self.max_value + i64::from(angle);
    }

    /// Absolute position of the last reading in raw counts.
    pub fn raw(&self) -> i64 {
        self.raw
    }

    /// Absolute position in degrees with the hysteresis bits cleared.
    pub fn absolute_degrees(&self) -> f64 {
        (self.raw & !self.mask) as f64 / self.max_value as f64 * 360.0
    }

    /// Smallest angle change the decoder can report, in degrees.
    pub fn angular_resolution(&self) -> f64 {
        (1_i64 << self.ignore_bits) as f64 / self.max_value as f64 * 360.0
    }

    pub fn resolution_bits(&self) -> u32 {
        self.resolution_bits
    }

    pub fn ignore_bits(&self) -> u32 {
        self.ignore_bits
    }
}
