use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;

/// Injectable time source. Services take a `&dyn Clock` so tests can step
/// wall time across expiry and finalization windows.
pub trait Clock: Send + Sync {
    /// Current wall-clock time, used for persisted timestamps.
    fn now(&self) -> SystemTime;
    /// Monotonic instant, used for in-process deadlines.
    fn monotonic(&self) -> Instant;
}

/// Production clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Steppable clock for tests. Wall time only advances when told to.
pub struct TestClock {
    epoch: Instant,
    offset: Mutex<Duration>,
    base: SystemTime,
}

impl TestClock {
    pub fn new(base: SystemTime) -> Self {
        Self {
            epoch: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            base,
        }
    }
    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for TestClock {
    fn now(&self) -> SystemTime {
        self.base + *self.offset.lock().unwrap()
    }
    fn monotonic(&self) -> Instant {
        self.epoch + *self.offset.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_steps_wall_time() {
        let clock = TestClock::default();
        let before = clock.now();
        clock.advance(Duration::from_secs(184));
        let after = clock.now();
        assert_eq!(after.duration_since(before).unwrap().as_secs(), 184);
    }
}
