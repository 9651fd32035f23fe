use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock expressed in seconds, the unit every timestamp in the
/// sensor stack (event times, dwell periods, wake times) uses.
///
/// - monotonic(): seconds since the clock's origin
/// - sleep_until(): block until `deadline` (implementations may simulate)
pub trait Clock {
    fn monotonic(&self) -> f64;
    fn sleep_until(&self, deadline: f64);

    /// Seconds remaining until `deadline`, saturating at 0.
    fn until(&self, deadline: f64) -> f64 {
        (deadline - self.monotonic()).max(0.0)
    }
}

/// Real-time clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn monotonic(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep_until(&self, deadline: f64) {
        let wait = self.until(deadline);
        if wait <= 0.0 {
            return;
        }
        thread::sleep(Duration::from_secs_f64(wait));
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// Clones share the same time source, so a test can hand one clone to the
/// monitor and keep another to advance it. `sleep_until` jumps forward.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(t: f64) -> Self {
        let clock = Self::new();
        clock.set(t);
        clock
    }

    /// Advance the clock by `secs`.
    pub fn advance(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += secs;
        }
    }

    /// Set the absolute time.
    pub fn set(&self, t: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = t;
        }
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> f64 {
        self.now.lock().map(|g| *g).unwrap_or(0.0)
    }

    fn sleep_until(&self, deadline: f64) {
        if let Ok(mut now) = self.now.lock() {
            if deadline > *now {
                *now = deadline;
            }
        }
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn monotonic(&self) -> f64 {
        (**self).monotonic()
    }
    fn sleep_until(&self, deadline: f64) {
        (**self).sleep_until(deadline);
    }
}
