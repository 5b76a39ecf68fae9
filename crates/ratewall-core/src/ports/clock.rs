//! Clock port so window arithmetic can be driven deterministically in tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current instant.
///
/// Any `Fn() -> DateTime<Utc>` closure is a clock as well, which is handy
/// for pinning time to a fixed value.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// Wall clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }

    /// Move the clock forward. Durations too large for chrono are ignored.
    pub fn advance(&self, by: Duration) {
        let Ok(delta) = chrono::Duration::from_std(by) else {
            return;
        };
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advances_all_clones() {
        let start = Utc.with_ymd_and_hms(2020, 3, 25, 10, 15, 30).unwrap();
        let clock = ManualClock::new(start);
        let shared = clock.clone();

        clock.advance(Duration::from_millis(1500));

        assert_eq!(shared.now(), start + chrono::Duration::milliseconds(1500));
    }

    #[test]
    fn test_closure_is_a_clock() {
        let fixed = Utc.with_ymd_and_hms(2020, 3, 25, 10, 15, 30).unwrap();
        let clock = move || fixed;
        assert_eq!(Clock::now(&clock), fixed);
    }
}
