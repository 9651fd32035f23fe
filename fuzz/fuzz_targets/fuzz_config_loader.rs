#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate errors are both fine; panics are not.
    if let Ok(cfg) = toml::from_str::<hrfs_config::Config>(data) {
        let _ = cfg.validate();
        let _ = cfg.transport_kind();
        let _ = cfg.extruder.filament_area();
    }
    // The trace loader sees the same untrusted text.
    let _ = hrfs_config::parse_trace(data.as_bytes());
});
