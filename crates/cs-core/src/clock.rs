//! Time sources
//!
//! Every decision reads "now" through a [`Clock`] so schedule matching and
//! staleness checks can be driven deterministically in tests.

use chrono::{DateTime, Duration, Local, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    /// Current local time
    fn now(&self) -> DateTime<Local>;

    /// Current time in UTC
    fn utc_now(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// The real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A controllable clock for tests and replays
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<RwLock<DateTime<Local>>>,
}

impl MockClock {
    /// Start at the current system time
    pub fn new() -> Self {
        Self::at(Local::now())
    }

    /// Start at a specific time
    pub fn at(time: DateTime<Local>) -> Self {
        Self {
            current: Arc::new(RwLock::new(time)),
        }
    }

    pub fn set(&self, time: DateTime<Local>) {
        *self.current.write() = time;
    }

    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.write();
        *current += duration;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mock_clock_advances() {
        let start = Local.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let clock = MockClock::at(start);
        clock.advance_minutes(90);
        assert_eq!(clock.now(), start + Duration::minutes(90));

        let shared = clock.clone();
        shared.advance_seconds(30);
        assert_eq!(clock.now(), start + Duration::seconds(90 * 60 + 30));
    }

    #[test]
    fn test_utc_now_matches_local() {
        let clock = MockClock::new();
        assert_eq!(clock.utc_now(), clock.now().with_timezone(&Utc));
    }
}
