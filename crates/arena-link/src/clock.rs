use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time source shared by the components of one link.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub type ClockHandle = Arc<dyn Clock>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Mutex::new(Instant::now()) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deadline-based timer. The owner polls it; nothing fires on its own.
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    periodic: bool,
    deadline: Option<Instant>,
}

impl Timer {
    pub fn one_shot(interval: Duration) -> Self {
        Self { interval, periodic: false, deadline: None }
    }

    pub fn periodic(interval: Duration) -> Self {
        Self { interval, periodic: true, deadline: None }
    }

    /// (Re)arms the timer one interval from `now`.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once per expiry. Periodic timers rearm from `now` so a
    /// late poll does not cause a burst of catch-up ticks.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if d <= now => {
                self.deadline = if self.periodic { Some(now + self.interval) } else { None };
                true
            }
            _ => false,
        }
    }
}

/// Earliest of two optional deadlines.
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once() {
        let clock = ManualClock::new();
        let mut t = Timer::one_shot(Duration::from_millis(10));
        t.start(clock.now());
        assert!(!t.fire(clock.now()));
        clock.advance(Duration::from_millis(10));
        assert!(t.fire(clock.now()));
        assert!(!t.is_active());
        assert!(!t.fire(clock.now()));
    }

    #[test]
    fn periodic_rearms() {
        let clock = ManualClock::new();
        let mut t = Timer::periodic(Duration::from_millis(250));
        t.start(clock.now());
        clock.advance(Duration::from_millis(250));
        assert!(t.fire(clock.now()));
        assert_eq!(t.deadline(), Some(clock.now() + Duration::from_millis(250)));
    }
}
