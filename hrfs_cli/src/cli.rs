//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[inline]
pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "hrfs", version, about = "High-resolution filament sensor monitor")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/hrfs.toml")]
    pub config: PathBuf,

    /// Print console output and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); RUST_LOG wins, then this,
    /// then `[logging] level`, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Knobs of the simulated print driven by `monitor`.
#[derive(clap::Args, Debug, Clone)]
pub struct SimArgs {
    /// Seconds of print to simulate
    #[arg(long, value_name = "SECS", default_value_t = 10.0)]
    pub duration: f64,
    /// Commanded extrusion speed in mm/s
    #[arg(long, value_name = "MM_S", default_value_t = 2.0)]
    pub speed: f64,
    /// Fraction of the commanded filament that never reaches the sensor (0..1)
    #[arg(long, value_name = "FRACTION", default_value_t = 0.0)]
    pub slip: f64,
    /// Take the filament away after this many seconds
    #[arg(long, value_name = "SECS")]
    pub runout_after: Option<f64>,
    /// Stop answering on the bus after this many seconds
    #[arg(long, value_name = "SECS")]
    pub disconnect_after: Option<f64>,
    /// Corrupt this many UART replies at the start (serial transport only)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub corrupt_frames: u32,
    /// Pace ticks on the wall clock instead of simulated time
    #[arg(long, action = ArgAction::SetTrue)]
    pub realtime: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a simulated print through the configured transport
    Monitor {
        #[command(flatten)]
        sim: SimArgs,
    },
    /// Replay a recorded sensor trace (CSV) deterministically
    Replay {
        /// Trace CSV with header time,commanded_epos,estimated_epos,magnet,presence,turns,angle
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        /// Print the status snapshot after every row
        #[arg(long, action = ArgAction::SetTrue)]
        status: bool,
    },
    /// Read the sensor once and print the filament sensor report
    Query,
    /// Quick health check (sensor presence / sim ok)
    SelfCheck,
}
