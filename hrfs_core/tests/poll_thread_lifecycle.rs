use std::thread;
use std::time::{Duration, Instant};

use hrfs_core::mocks::{RecordingSink, ScriptedHost, ScriptedTransport};
use hrfs_core::{CommandedMoveTap, FilamentMonitor, PollThread, SharedMonitor};
use hrfs_traits::{Clock, ManualClock, MonotonicClock, MoveTransform};

fn shared_with(clock: impl Clock + Send + Sync + 'static, transport: ScriptedTransport) -> SharedMonitor {
    let monitor = FilamentMonitor::builder()
        .with_transport(transport)
        .with_host(ScriptedHost::new())
        .with_alerts(RecordingSink::new())
        .with_clock(clock)
        .build()
        .unwrap();
    SharedMonitor::new(monitor)
}

#[test]
fn poll_thread_publishes_status_and_joins_on_drop() {
    let clock = MonotonicClock::new();
    let transport = ScriptedTransport::new();
    let monitor = shared_with(clock, transport.clone());
    let poller = PollThread::spawn(monitor.clone(), clock);

    let deadline = Instant::now() + Duration::from_secs(5);
    while poller.ticks() < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(poller.ticks() >= 3);
    let status = poller.latest().expect("at least one status");
    assert!(status.sensor_connected);
    assert!(!poller.is_finished());

    let started = Instant::now();
    drop(poller);
    assert!(started.elapsed() < Duration::from_secs(1));

    // the monitor is still usable after the thread is gone
    transport.disconnect();
    let now = MonotonicClock::new().monotonic();
    monitor.tick(now).unwrap();
    assert!(!monitor.status().unwrap().sensor_connected);
}

#[test]
fn manual_clock_drives_poll_thread_without_waiting() {
    let clock = ManualClock::new();
    let monitor = shared_with(clock.clone(), ScriptedTransport::new());
    let poller = PollThread::spawn(monitor, clock.clone());

    let deadline = Instant::now() + Duration::from_secs(5);
    while poller.ticks() < 50 && Instant::now() < deadline {
        thread::yield_now();
    }
    assert!(poller.ticks() >= 50);
    // each sleep jumps the clock to the next re-arm time
    assert!(clock.monotonic() >= 4.8);
}

#[test]
fn latest_snapshot_is_available_after_ticks() {
    let clock = ManualClock::new();
    let monitor = shared_with(clock.clone(), ScriptedTransport::new());
    let poller = PollThread::spawn(monitor, clock);
    let deadline = Instant::now() + Duration::from_secs(5);
    while poller.ticks() < 10 && Instant::now() < deadline {
        thread::yield_now();
    }
    assert!(poller.latest().is_some());
}

#[derive(Default)]
struct Sink {
    moved: Vec<[f64; 4]>,
}

impl MoveTransform for Sink {
    fn move_to(
        &mut self,
        newpos: [f64; 4],
        _speed: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.moved.push(newpos);
        Ok(())
    }

    fn position(&self) -> [f64; 4] {
        self.moved.last().copied().unwrap_or_default()
    }
}

#[test]
fn tap_forwards_moves_and_opens_ledger_entries() {
    let clock = ManualClock::new();
    let monitor = shared_with(clock.clone(), ScriptedTransport::new());
    monitor.set_printing(true).unwrap();
    let mut tap = CommandedMoveTap::new(Sink::default(), monitor.clone());

    tap.move_to([1.0, 0.0, 0.0, 0.0], 50.0).unwrap();
    tap.move_to([1.0, 0.0, 0.0, 2.5], 5.0).unwrap();
    tap.move_to([1.0, 0.0, 0.0, 4.0], 5.0).unwrap();

    assert_eq!(tap.next_mut().moved.len(), 3);
    assert_eq!(tap.position(), [1.0, 0.0, 0.0, 4.0]);
    let (moves, last_epos) = monitor
        .with(|m| (m.ledger().len(), m.last_epos()))
        .unwrap();
    // the travel move does not change the extruder
    assert_eq!(moves, 2);
    assert_eq!(last_epos, 4.0);
}
