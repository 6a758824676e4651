use std::time::{Duration, Instant};

/// Interval timer driven by the host's clock. Endpoints never read the wall
/// clock themselves; `now` arrives through their update calls, which keeps
/// timeout behavior reproducible in tests.
#[derive(Clone, Debug)]
pub struct Timer {
    interval: Duration,
    last: Instant,
}

impl Timer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self { interval, last: now }
    }

    pub fn ringing(&self, now: Instant) -> bool {
        now.duration_since(self.last) >= self.interval
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

// Tests
