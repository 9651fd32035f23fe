use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("no response from sensor")]
    NoResponse,
    #[error("crc mismatch: frame carries {actual:#04x}, computed {expected:#04x}")]
    CrcMismatch { expected: u8, actual: u8 },
    #[error("wrong message prefix: {0}")]
    BadPrefix(String),
    #[error("response for reg {actual:#04x} (expected {expected:#04x})")]
    RegisterMismatch { expected: u8, actual: u8 },
    #[error("frame too short: {0} bytes")]
    ShortFrame(usize),
    #[error("expected {expected} bytes but got {actual}: '{raw}'")]
    ShortBlock {
        expected: usize,
        actual: usize,
        raw: String,
    },
    #[error("bus error: {0}")]
    Bus(String),
}

impl HwError {
    /// True for failures that a fresh request may cure. A reply that is
    /// intact but answers the wrong question is not retried.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            HwError::BadPrefix(_) | HwError::RegisterMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
