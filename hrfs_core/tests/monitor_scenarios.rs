//! End-to-end behavior of the poll loop against scripted collaborators.
//!
//! Every scenario starts the monitor at t=0 (startup grace until t=2.0),
//! ticks every 100 ms on a manual clock and uses a 23 mm rotation distance
//! with 3 ignored bits.

use hrfs_core::mocks::{RecordingSink, ScriptedHost, ScriptedTransport, SinkEntry};
use hrfs_core::{FilamentMonitor, MagnetState, MotionDirection, RunoutCfg, SensorCfg};
use hrfs_traits::{Clock, ManualClock};
use rstest::rstest;

const RD: f64 = 23.0;

struct Rig {
    clock: ManualClock,
    transport: ScriptedTransport,
    host: ScriptedHost,
    sink: RecordingSink,
    monitor: FilamentMonitor,
}

impl Rig {
    fn new(runout: RunoutCfg) -> Self {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let host = ScriptedHost::new();
        let sink = RecordingSink::new();
        let mut monitor = FilamentMonitor::builder()
            .with_transport(transport.clone())
            .with_host(host.clone())
            .with_alerts(sink.clone())
            .with_clock(clock.clone())
            .with_sensor(SensorCfg::default())
            .with_runout(runout)
            .build()
            .unwrap();
        monitor.start();
        Self {
            clock,
            transport,
            host,
            sink,
            monitor,
        }
    }

    /// Started, past the startup grace, printing, one baseline tick done.
    fn printing(runout: RunoutCfg) -> Self {
        let mut rig = Self::new(runout);
        rig.clock.set(2.0);
        rig.monitor.set_printing(true);
        rig.tick();
        rig
    }

    fn tick(&mut self) -> f64 {
        let now = self.clock.monotonic();
        self.monitor.tick(now)
    }

    /// Advance the clock by one poll interval and tick.
    fn step(&mut self) {
        self.clock.advance(0.1);
        self.tick();
    }

    fn steps(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }
}

fn quick_runout() -> RunoutCfg {
    RunoutCfg {
        underextrusion_max_rate: 0.1,
        underextrusion_period: 2.0,
        move_evaluation_distance: 3.0,
        event_delay: 0.0,
        ..RunoutCfg::default()
    }
}

#[rstest]
fn tick_rearms_one_interval_after_eventtime() {
    let mut rig = Rig::new(RunoutCfg::default());
    let next = rig.monitor.tick(0.37);
    assert!((next - 0.47).abs() < 1e-12);
}

#[rstest]
fn baselines_produce_no_messages() {
    let mut rig = Rig::new(RunoutCfg::default());
    rig.tick();
    assert!(rig.sink.entries().is_empty());
    assert!(rig.monitor.is_connected());
    assert_eq!(rig.monitor.magnet_state(), MagnetState::Detected);
    let status = rig.monitor.status();
    assert!(status.sensor_connected);
    assert!(status.filament_detected);
}

#[rstest]
fn underextrusion_alerts_after_period_and_clears_on_recovery() {
    let mut rig = Rig::printing(quick_runout());

    // 5 mm commanded and reached by the host, sensor sees nothing
    rig.host.command(5.0);
    rig.step(); // t=2.1, timer starts
    assert_eq!(rig.monitor.evaluation_move().unwrap().expected_distance(), Some(5.0));
    assert_eq!(rig.monitor.status().motion.measured_distance, 0.0);
    assert!((rig.monitor.status().underextrusion_rate - 1.0).abs() < 1e-12);

    rig.steps(19); // t=4.0, 1.9 s of under-extrusion
    assert!(rig.sink.runouts().is_empty());
    assert!(!rig.monitor.is_underextruding());

    rig.steps(2); // t=4.2, over 2 s
    assert!(rig.monitor.is_underextruding());
    assert!(rig.monitor.is_runout());
    let runouts = rig.sink.runouts();
    assert_eq!(runouts.len(), 1);
    assert_eq!(runouts[0].script, "PAUSE\n\nM400");
    assert!(runouts[0].pause);
    assert!((runouts[0].pause_until - runouts[0].eventtime - 0.5).abs() < 1e-9);
    assert!(
        rig.sink
            .errors()
            .contains(&"filament_sensor: Detected underextrusion for over 2.00s".to_string())
    );

    // filament catches up to 4.6 of the 5 mm
    rig.transport.set_position_mm(4.6, RD);
    rig.step();
    assert!(!rig.monitor.is_underextruding());
    assert!(!rig.monitor.is_runout());
    assert!(
        rig.sink
            .messages()
            .iter()
            .any(|m| m.starts_with("filament_sensor: Underextrusion cleared after "))
    );
    assert_eq!(rig.sink.runouts().len(), 1);
}

#[rstest]
fn disconnect_is_reported_once_and_takes_priority() {
    let mut rig = Rig::printing(quick_runout());
    rig.transport.set_filament_present(false);
    rig.transport.disconnect();
    rig.step();

    assert!(rig.monitor.is_unhealthy());
    // runout never evaluated while unhealthy
    assert!(!rig.monitor.is_runout());
    assert_eq!(
        rig.sink.errors(),
        vec![
            "filament_sensor: No longer connected or data cannot be read".to_string(),
            "filament_sensor: Unhealthy (no data from sensor)".to_string(),
        ]
    );
    assert_eq!(rig.sink.runouts().len(), 1);

    rig.steps(50);
    assert_eq!(rig.sink.runouts().len(), 1);
    assert_eq!(rig.sink.errors().len(), 2);

    rig.transport.set_filament_present(true);
    rig.transport.reconnect();
    rig.step();
    assert!(!rig.monitor.is_unhealthy());
    assert!(
        rig.sink
            .messages()
            .contains(&"filament_sensor: Reconnected".to_string())
    );
}

#[rstest]
#[case(1, "magnet not detected")]
#[case(2, "magnet too weak")]
#[case(3, "magnet too strong")]
#[case(0xFF, "magnet unknown")]
fn bad_magnet_is_unhealthy(#[case] raw: u8, #[case] reason: &str) {
    let mut rig = Rig::printing(quick_runout());
    rig.transport.set_magnet_state(raw);
    rig.step();
    assert!(rig.monitor.is_connected());
    assert!(rig.monitor.is_unhealthy());
    assert_eq!(
        rig.sink.errors(),
        vec![format!("filament_sensor: Unhealthy ({reason})")]
    );
    assert_eq!(rig.sink.runouts().len(), 1);
}

#[rstest]
fn missing_filament_is_immediate_runout() {
    let mut rig = Rig::printing(RunoutCfg {
        runout_gcode: "M117 Runout".into(),
        ..RunoutCfg::default()
    });
    rig.transport.set_filament_present(false);
    rig.step();
    assert!(rig.monitor.is_runout());
    let runouts = rig.sink.runouts();
    assert_eq!(runouts.len(), 1);
    assert_eq!(runouts[0].script, "PAUSE\nM117 Runout\nM400");
    assert_eq!(
        rig.sink.entries()[0],
        SinkEntry::Error("filament_sensor: Filament not present".into())
    );

    rig.transport.set_filament_present(true);
    rig.steps(40); // past the 3 s event delay
    assert!(!rig.monitor.is_runout());
    assert!(
        rig.sink
            .messages()
            .contains(&"filament_sensor: Filament present".to_string())
    );
}

#[rstest]
fn startup_grace_suppresses_alerts() {
    let mut rig = Rig::new(RunoutCfg::default());
    rig.monitor.set_printing(true);
    rig.transport.set_filament_present(false);
    for _ in 0..19 {
        rig.tick();
        rig.clock.advance(0.1);
    }
    // t=1.9
    assert!(rig.sink.runouts().is_empty());
    assert!(!rig.monitor.is_runout());
    rig.clock.set(2.0);
    rig.tick();
    assert_eq!(rig.sink.runouts().len(), 1);
}

#[rstest]
fn nothing_is_evaluated_unless_printing_and_enabled() {
    let mut rig = Rig::new(RunoutCfg::default());
    rig.clock.set(2.0);
    rig.tick();
    rig.transport.set_filament_present(false);
    rig.step();
    assert!(rig.sink.runouts().is_empty());
    // presence is still reported
    assert_eq!(rig.sink.errors().len(), 1);

    rig.monitor.set_printing(true);
    rig.monitor.set_enabled(false);
    rig.step();
    assert!(rig.sink.runouts().is_empty());
    assert!(!rig.monitor.status().enabled);

    rig.monitor.set_enabled(true);
    rig.step();
    assert_eq!(rig.sink.runouts().len(), 1);
}

#[rstest]
fn event_delay_holds_off_the_next_alert() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.transport.set_filament_present(false);
    rig.step();
    let fired_at = rig.clock.monotonic();
    assert_eq!(rig.sink.runouts().len(), 1);
    assert!((rig.monitor.min_event_time() - (fired_at + 3.0)).abs() < 1e-9);

    rig.transport.set_filament_present(true);
    rig.transport.disconnect();
    rig.steps(25); // 2.5 s
    assert!(!rig.monitor.is_unhealthy());
    rig.steps(10);
    assert!(rig.monitor.is_unhealthy());
    assert_eq!(rig.sink.runouts().len(), 2);
}

#[rstest]
fn failing_runout_script_still_starts_quiet_period() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.sink.fail_runout_scripts(true);
    rig.transport.set_filament_present(false);
    rig.step();
    assert_eq!(rig.sink.runouts().len(), 1);
    assert!(rig.monitor.min_event_time() > rig.clock.monotonic());
}

#[rstest]
fn status_reports_motion_of_open_window() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.host.command(10.0);
    rig.step();
    rig.transport.set_position_mm(2.3, RD);
    rig.step();
    rig.transport.set_position_mm(4.6, RD);
    rig.step();

    let status = rig.monitor.status();
    let m = status.motion;
    assert!(m.detected);
    assert_eq!(m.direction, MotionDirection::Extruding);
    assert_eq!(m.commanded_distance, 10.0);
    assert_eq!(m.expected_distance, 10.0);
    // 4.6 mm quantized to the 8-count resolution
    assert!((m.measured_distance - 4.6).abs() < 0.05);
    let duration = 0.1;
    assert!((m.measured_speed - m.measured_distance / duration).abs() < 1e-3);
    let area = std::f64::consts::PI * 0.875 * 0.875;
    assert!((m.measured_volumetric_flow - area * m.measured_speed).abs() < 1e-9);
    assert!((status.underextrusion_rate - (1.0 - m.measured_distance / 10.0)).abs() < 1e-12);
    assert!((status.position - m.measured_distance).abs() < 1e-12);

    rig.monitor.set_printing(false);
    rig.step();
    let status = rig.monitor.status();
    assert_eq!(status.motion.commanded_distance, 0.0);
    assert_eq!(status.motion.measured_speed, 0.0);
    assert_eq!(status.underextrusion_rate, 0.0);
    assert!(status.motion.detected);
}

#[rstest]
fn reversing_is_reported() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.transport.set_position_mm(10.0, RD);
    rig.step();
    rig.host.command(-2.0);
    rig.step();
    rig.transport.set_position_mm(8.0, RD);
    rig.step();
    assert_eq!(
        rig.monitor.status().motion.direction,
        MotionDirection::Reversing
    );
}

#[rstest]
fn inverted_sensor_negates_position() {
    let clock = ManualClock::new();
    let transport = ScriptedTransport::new();
    let mut monitor = FilamentMonitor::builder()
        .with_transport(transport.clone())
        .with_host(ScriptedHost::new())
        .with_alerts(RecordingSink::new())
        .with_clock(clock)
        .with_sensor(SensorCfg {
            invert_direction: true,
            hysteresis_bits: 0,
            ..SensorCfg::default()
        })
        .build()
        .unwrap();
    transport.set_counts(4095);
    monitor.tick(0.0);
    assert!((monitor.position() + RD).abs() < 1e-9);
}

#[rstest]
fn printing_start_clears_ledger_and_stop_ends_moves() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.host.command(1.0);
    rig.step();
    rig.host.command(2.0);
    rig.step();
    assert_eq!(rig.monitor.ledger().len(), 2);

    rig.monitor.set_printing(false);
    assert!(rig.monitor.ledger().iter().all(|m| m.ended));
    assert!(!rig.monitor.is_printing());

    rig.monitor.set_printing(true);
    assert!(rig.monitor.ledger().is_empty());
    assert!(rig.monitor.evaluation_move().is_none());
}

#[rstest]
fn inactive_extruder_opens_no_moves() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.host.set_commanded(None);
    rig.step();
    assert!(rig.monitor.ledger().is_empty());
    rig.host.command(3.0);
    rig.step();
    assert_eq!(rig.monitor.ledger().len(), 1);
}

#[rstest]
fn set_extruder_position_rebases_without_a_move() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.monitor.set_extruder_position(100.0);
    rig.host.command(100.0);
    rig.step();
    assert!(rig.monitor.ledger().is_empty());

    rig.host.command(101.0);
    rig.step();
    let current = rig.monitor.ledger().current().unwrap();
    assert_eq!(current.last_epos, 100.0);
    assert_eq!(current.distance, 1.0);
}

#[rstest]
fn next_move_starts_from_last_observed_estimate() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.host.set_commanded(Some(5.0));
    rig.host.set_estimated(3.5);
    rig.step();
    rig.host.set_commanded(Some(8.0));
    rig.step();
    let current = rig.monitor.ledger().current().unwrap();
    assert_eq!(current.last_epos, 3.5);
    assert_eq!(rig.monitor.last_epos(), 8.0);
}

#[rstest]
fn out_of_band_commands_share_the_ledger() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.monitor.note_commanded_position(4.0);
    assert_eq!(rig.monitor.ledger().len(), 1);
    // host reports the same position on the next poll: no duplicate
    rig.host.command(4.0);
    rig.step();
    assert_eq!(rig.monitor.ledger().len(), 1);
}

#[rstest]
fn stopped_moving_after_dwell() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.host.command(2.0);
    rig.step();
    assert!(!rig.monitor.has_stopped_moving());
    rig.transport.set_position_mm(2.0, RD);
    rig.step();
    assert!(!rig.monitor.has_stopped_moving());
    rig.steps(2);
    assert!(rig.monitor.has_stopped_moving());
}

#[rstest]
fn history_capture_and_whole_ledger_fold() {
    let mut rig = Rig::printing(RunoutCfg::default());
    rig.monitor.capture_history(true);
    rig.host.command(1.0);
    rig.steps(3);
    rig.host.command(2.0);
    rig.steps(2);
    let all = rig.monitor.combined_moves().unwrap();
    assert_eq!(all.sensor_events().len(), 5);
    assert_eq!(all.last_epos, 0.0);
    assert_eq!(all.epos, 2.0);
    let times: Vec<f64> = all.sensor_events().iter().map(|e| e.eventtime).collect();
    assert!(times.windows(2).all(|w| w[0] > w[1]));
}

#[rstest]
fn probe_reads_without_changing_state() {
    let mut rig = Rig::new(RunoutCfg::default());
    rig.transport.set_counts(800);
    let reading = rig.monitor.probe().unwrap();
    assert_eq!(reading.angle, 800);
    assert_eq!(rig.monitor.position(), 0.0);
    rig.transport.disconnect();
    assert!(rig.monitor.probe().is_err());
}

#[rstest]
fn query_report_lists_state_and_resolution() {
    let mut rig = Rig::new(RunoutCfg::default());
    rig.tick();
    let report = rig.monitor.query_report();
    assert!(report.starts_with("Filament Sensor filament_sensor:"));
    assert!(report.contains("- sensor connected"));
    assert!(report.contains("- filament detected"));
    assert!(report.contains("- runout not detected"));
    assert!(report.contains("- resolution: 12 bits (lower 3 bits are ignored)"));
    assert!(report.contains("- smallest detectable angular change: 0.7033 degree"));
    // 8 counts of 4095 on a 23 mm wheel
    assert!(report.contains("0.0449 mm"), "{report}");
    assert!((rig.monitor.detectable_angle_change() - 8.0 / 4095.0 * 360.0).abs() < 1e-12);
}
