#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core filament motion monitoring (hardware-agnostic).
//!
//! This crate turns raw encoder readings into filament positions, attributes
//! them to the extruder moves the host commands, and raises runout and
//! under-extrusion alerts. All external interactions go through the traits
//! in `hrfs_traits`.
//!
//! ## Architecture
//!
//! - **Rotation**: turns + angle to absolute degrees with hysteresis (`rotation`)
//! - **Moves**: commanded moves, sensor events, bounded ledger (`moves`)
//! - **Anomalies**: health, runout, under-extrusion timer (`anomaly`)
//! - **Poll loop**: `FilamentMonitor::tick`, re-armed every 100 ms (`monitor`)
//! - **Concurrency**: `SharedMonitor` and the background `PollThread`
//! - **Motion intercept**: non-linear extrusion compensation (`nonlinear`)
//!
//! Timestamps are `f64` seconds on the host's monotonic clock.

pub mod anomaly;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod edge;
pub mod error;
pub mod mocks;
pub mod monitor;
pub mod moves;
pub mod nonlinear;
pub mod poller;
pub mod rotation;
pub mod runner;
pub mod shared;
pub mod status;

pub use anomaly::{AnomalyEngine, AnomalyEvent, Evaluation, Health, MagnetState};
pub use builder::{Missing, MonitorBuilder, Set};
pub use config::{RunoutCfg, SensorCfg};
pub use edge::{Edge, EdgeTrigger};
pub use error::{BuildError, MonitorError, Result};
pub use monitor::FilamentMonitor;
pub use moves::{CommandedMove, MotionDirection, MoveLedger, SensorEvent};
pub use nonlinear::NonLinearExtrusion;
pub use poller::PollThread;
pub use rotation::RotationDecoder;
pub use shared::{CommandedMoveTap, SharedMonitor};
pub use status::{MotionStatus, SensorStatus};
