use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

pub type Timestamp = DateTime<Utc>;

/// Source of wall-clock time for liveness tracking.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Whole seconds elapsed from `t0` to `t1` (negative if `t1` is earlier).
    fn diff_seconds(&self, t1: Timestamp, t0: Timestamp) -> i64 {
        (t1 - t0).num_seconds()
    }
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.  Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Clock starting at the given Unix time.
    pub fn at_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, time: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::at_unix(1_000);
        let other = clock.clone();
        clock.advance_secs(30);
        assert_eq!(other.now().timestamp(), 1_030);
    }

    #[test]
    fn diff_seconds_is_signed() {
        let clock = ManualClock::at_unix(0);
        let t0 = clock.now();
        clock.advance_secs(90);
        let t1 = clock.now();
        assert_eq!(clock.diff_seconds(t1, t0), 90);
        assert_eq!(clock.diff_seconds(t0, t1), -90);
    }
}
