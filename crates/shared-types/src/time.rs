//! Time source abstraction.
//!
//! Abstracted so rollout ramps and detection timestamps can be tested with a
//! pinned clock.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Time source for consistent timestamp handling.
pub trait TimeSource: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualTimeSource {
    time: RwLock<DateTime<Utc>>,
}

impl ManualTimeSource {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            time: RwLock::new(initial),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.time.write();
        *time += by;
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write() = time;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_time_source() {
        let source = SystemTimeSource;
        // Should be a reasonable timestamp (after year 2020)
        assert!(source.now().timestamp() > 1_577_836_800);
    }

    #[test]
    fn test_manual_time_source() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let source = ManualTimeSource::new(start);
        assert_eq!(source.now(), start);

        source.advance(Duration::hours(2));
        assert_eq!(source.now(), start + Duration::hours(2));

        source.set(start);
        assert_eq!(source.now(), start);
    }
}
