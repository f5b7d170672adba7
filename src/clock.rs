use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time for file ages, filenames and record timestamps.
///
/// Rotation decisions compare this clock against file modification times, so
/// implementations must report real wall-clock instants rather than a
/// monotonic counter.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;

    /// Microseconds since the UNIX epoch; zero if the clock is before the epoch.
    fn now_micros(&self) -> u64 {
        micros_since_epoch(self.now())
    }
}

/// A clock backed by `std::time::SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
///
/// Used to drive age-based rotation deterministically.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Starts at the current wall-clock time, truncated to whole seconds.
    pub fn starting_now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::new(UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: SystemTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn micros_since_epoch(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Elapsed time from `earlier` to `now`, clamped to zero when `earlier` is in the future.
pub fn age_at(now: SystemTime, earlier: SystemTime) -> Duration {
    now.duration_since(earlier).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), start + Duration::from_secs(5));
        assert_eq!(clock.now_micros(), 1_005_000_000);
    }

    #[test]
    fn test_age_clamps_future_timestamps() {
        let now = UNIX_EPOCH + Duration::from_secs(10);
        let later = now + Duration::from_secs(3);
        assert_eq!(age_at(now, later), Duration::ZERO);
        assert_eq!(age_at(later, now), Duration::from_secs(3));
    }
}
