//! Clock abstraction for launch timestamps
//!
//! Production code uses `SystemClock`, which delegates to `chrono::Utc::now()`.
//! Tests use `MockClock` to pin `startDate` values.

use chrono::{DateTime, SecondsFormat, Utc};

/// Trait for getting the current time
///
/// Injected into the LifecycleController so launch timestamps are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to `chrono::Utc::now()`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format a timestamp as ISO-8601 UTC with millisecond precision ("2026-05-01T10:00:00.000Z")
pub fn iso_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Mock clock for testing with controllable time
#[cfg(test)]
#[allow(clippy::expect_used)]
pub struct MockClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    #[allow(dead_code)]
    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().expect("MockClock lock poisoned");
        *now += duration;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("MockClock lock poisoned")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_clock_returns_time() {
        let clock = SystemClock;
        // After 2020-01-01
        assert!(clock.now().timestamp() > 1_577_836_800);
    }

    #[test]
    fn test_iso_timestamp_is_utc_millis() {
        let time = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(iso_timestamp(time), "2026-05-01T10:00:00.000Z");
    }

    #[test]
    fn test_mock_clock_advance() {
        let fixed = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        let clock = MockClock::new(fixed);
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(iso_timestamp(clock.now()), "2026-05-01T10:01:30.000Z");
    }
}
