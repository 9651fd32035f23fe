use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MonitorError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("non-linear extrusion: {0}")]
    NonLinear(String),
    #[error("runout script failed: {0}")]
    Alert(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing register transport")]
    MissingTransport,
    #[error("missing extruder host")]
    MissingHost,
    #[error("missing alert sink")]
    MissingAlertSink,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
