//! Human-readable error descriptions and structured JSON error formatting.

use thiserror::Error;

/// Run outcomes the CLI reports as failures.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("runout action fired {0} time(s)")]
    RunoutTriggered(u64),
    #[error("sensor check failed: {0}")]
    SensorCheck(String),
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use hrfs_core::error::{BuildError, MonitorError};
    use hrfs_hardware::error::HwError;

    // Typed matches first
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::RunoutTriggered(n) => format!(
                "What happened: The monitor requested a print pause ({n} runout action(s)).\nLikely causes: Filament ran out, slipped or the sensor became unhealthy.\nHow to fix: Inspect the console lines above for the reason, then resume."
            ),
            CliError::SensorCheck(msg) => format!(
                "What happened: Sensor check failed ({msg}).\nLikely causes: Magnet misaligned, no filament loaded, or sensor not answering.\nHow to fix: Seat the magnet, load filament and verify wiring, then rerun self-check."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingTransport => {
                "What happened: No register transport was provided to the monitor.\nLikely causes: The sensor bus failed to open or was not wired into the builder.\nHow to fix: Check the [i2c] or [uart] section of the config.".to_string()
            }
            BuildError::MissingHost | BuildError::MissingAlertSink => format!(
                "What happened: The monitor was assembled incompletely ({be}).\nLikely causes: Internal wiring error.\nHow to fix: Re-run with --log-level=debug and report the output."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MonitorError>() {
        if let MonitorError::Transport(msg) = me {
            return format!(
                "What happened: The sensor could not be read ({msg}).\nLikely causes: Wrong bus or address, loose wiring, or line noise corrupting frames.\nHow to fix: Verify the [i2c]/[uart] settings and the sensor's power and wiring."
            );
        }
        return format!(
            "What happened: {me}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    if let Some(he) = err.downcast_ref::<HwError>() {
        return format!(
            "What happened: Sensor bus failure ({he}).\nLikely causes: Wrong bus number or address, missing permissions on the i2c device.\nHow to fix: Check [i2c] bus/address and that the process may open /dev/i2c-*."
        );
    }

    // String-based heuristics for errors coming from config and trace loading;
    // the alternate form carries the whole context chain.
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("trace csv must have headers") {
        return "Invalid headers in trace CSV. Expected 'time,commanded_epos,estimated_epos,magnet,presence,turns,angle'.".to_string();
    }

    if lower.contains("trace") && (lower.contains("csv") || lower.contains("row")) {
        return format!(
            "What happened: The trace could not be replayed.\nLikely causes: Malformed rows or time going backwards.\nHow to fix: Fix the CSV. Original: {msg}"
        );
    }

    if lower.contains("failed to read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") || lower.contains("failed to parse config") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Missing [motion]/[runout] sections or out-of-range values.\nHow to fix: Edit the TOML config and try again. Details: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 for a runout, 4 for a failed sensor check, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::RunoutTriggered(_)) => 3,
        Some(CliError::SensorCheck(_)) => 4,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match err.downcast_ref::<CliError>() {
        Some(CliError::RunoutTriggered(_)) => "Runout",
        Some(CliError::SensorCheck(_)) => "SensorCheck",
        None => "Error",
    };
    match err.downcast_ref::<CliError>() {
        Some(CliError::RunoutTriggered(n)) => {
            json!({ "reason": reason, "details": { "runouts": n }, "message": humanize(err) })
        }
        _ => json!({ "reason": reason, "message": humanize(err) }),
    }
    .to_string()
}
