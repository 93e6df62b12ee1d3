//! Wall-clock source for restart stamps and key expiration.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use std::sync::Mutex;

/// Supplies the current local date and time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// The host's local clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Used by tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `(YYYYMMDD, HHMMSS)` as integers. Ordering the pairs lexicographically
/// orders the instants.
pub fn stamp(at: NaiveDateTime) -> (i64, i64) {
    let date = i64::from(at.year()) * 10_000 + i64::from(at.month()) * 100 + i64::from(at.day());
    let time = i64::from(at.hour()) * 10_000 + i64::from(at.minute()) * 100 + i64::from(at.second());
    (date, time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_stamp() {
        assert_eq!(stamp(at(2026, 10, 16, 9, 5, 7)), (20261016, 90507));
        assert_eq!(stamp(at(2026, 1, 2, 23, 59, 59)), (20260102, 235959));
    }

    #[test]
    fn test_stamp_orders_across_midnight() {
        let before = stamp(at(2026, 10, 16, 23, 59, 59));
        let after = stamp(at(2026, 10, 17, 0, 0, 0));
        assert!(before < after);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(at(2026, 10, 16, 12, 0, 0));
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now(), at(2026, 10, 16, 12, 1, 30));
        clock.set(at(2027, 1, 1, 0, 0, 0));
        assert_eq!(stamp(clock.now()).0, 20270101);
    }
}
