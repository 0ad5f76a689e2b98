//! Time-of-day windows and clocks
//!
//! All schedule checks in the workspace go through [`is_within_window`], so
//! working hours, night mode and blind schedules share one wraparound rule:
//! a window whose start is after its stop spans midnight.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// True if `now` lies in the window from `start` to `stop`, both inclusive
///
/// When `start > stop` the window wraps past midnight.
pub fn is_within_window(now: NaiveTime, start: NaiveTime, stop: NaiveTime) -> bool {
    if start <= stop {
        start <= now && now <= stop
    } else {
        now >= start || now <= stop
    }
}

pub fn is_before(now: NaiveTime, time: NaiveTime) -> bool {
    now < time
}

pub fn is_after(now: NaiveTime, time: NaiveTime) -> bool {
    now > time
}

/// Time until the next occurrence of `at`, strictly after `now`
pub fn until_next(now: NaiveDateTime, at: NaiveTime) -> std::time::Duration {
    let today = now.date().and_time(at);
    let next = if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    };
    (next - now).to_std().unwrap_or_default()
}

/// Source of the current local time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn time_of_day(&self) -> NaiveTime {
        self.now().time()
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<NaiveDateTime>,
}

impl MockClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// A clock at `hour:minute` on an arbitrary fixed date
    pub fn at(hour: u32, minute: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default();
        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
        Self::new(date.and_time(time))
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn set_time(&self, hour: u32, minute: u32) {
        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
        let date = self.now().date();
        self.set(date.and_time(time));
    }

    pub fn advance(&self, by: ChronoDuration) {
        let now = self.now();
        self.set(now + by);
    }
}

impl Clock for MockClock {
    fn now(&self) -> NaiveDateTime {
        self.now
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// A time of day that is either fixed or computed on every call
///
/// Dynamic times are never cached, so a source such as "sunset today" is
/// re-evaluated each time a guard runs.
#[derive(Clone)]
pub enum TimeOfDay {
    Fixed(NaiveTime),
    Dynamic(Arc<dyn Fn() -> NaiveTime + Send + Sync>),
}

impl TimeOfDay {
    pub fn dynamic(f: impl Fn() -> NaiveTime + Send + Sync + 'static) -> Self {
        TimeOfDay::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self) -> NaiveTime {
        match self {
            TimeOfDay::Fixed(t) => *t,
            TimeOfDay::Dynamic(f) => f(),
        }
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        TimeOfDay::Fixed(t)
    }
}

impl fmt::Debug for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Fixed(t) => write!(f, "Fixed({})", t),
            TimeOfDay::Dynamic(_) => write!(f, "Dynamic({})", self.resolve()),
        }
    }
}

/// A daily window between two times of day
#[derive(Debug, Clone)]
pub struct ScheduleWindow {
    pub start: TimeOfDay,
    pub stop: TimeOfDay,
}

impl ScheduleWindow {
    pub fn new(start: impl Into<TimeOfDay>, stop: impl Into<TimeOfDay>) -> Self {
        Self {
            start: start.into(),
            stop: stop.into(),
        }
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        is_within_window(now, self.start.resolve(), self.stop.resolve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_window_wraps_past_midnight() {
        assert!(is_within_window(t(23, 45), t(23, 0), t(6, 0)));
        assert!(is_within_window(t(2, 0), t(23, 0), t(6, 0)));
        assert!(!is_within_window(t(12, 0), t(23, 0), t(6, 0)));
    }

    #[test]
    fn test_window_same_day() {
        assert!(is_within_window(t(7, 0), t(6, 0), t(23, 0)));
        assert!(!is_within_window(t(5, 59), t(6, 0), t(23, 0)));
        assert!(!is_within_window(t(23, 30), t(6, 0), t(23, 0)));
    }

    #[test]
    fn test_window_bounds_inclusive() {
        assert!(is_within_window(t(6, 0), t(6, 0), t(23, 0)));
        assert!(is_within_window(t(23, 0), t(6, 0), t(23, 0)));
        assert!(is_within_window(t(23, 0), t(23, 0), t(6, 0)));
        assert!(is_within_window(t(6, 0), t(23, 0), t(6, 0)));
    }

    #[test]
    fn test_before_and_after() {
        assert!(is_before(t(8, 0), t(9, 0)));
        assert!(!is_before(t(9, 0), t(9, 0)));
        assert!(is_after(t(9, 1), t(9, 0)));
        assert!(!is_after(t(9, 0), t(9, 0)));
    }

    #[test]
    fn test_until_next() {
        let clock = MockClock::at(20, 0);
        assert_eq!(
            until_next(clock.now(), t(22, 30)),
            std::time::Duration::from_secs(150 * 60)
        );
        assert_eq!(
            until_next(clock.now(), t(8, 0)),
            std::time::Duration::from_secs(12 * 3600)
        );
        assert_eq!(
            until_next(clock.now(), t(20, 0)),
            std::time::Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn test_dynamic_time_is_evaluated_every_call() {
        let clock = Arc::new(MockClock::at(10, 0));
        let source = clock.clone();
        let window = ScheduleWindow::new(
            TimeOfDay::dynamic(move || source.time_of_day()),
            t(23, 0),
        );

        assert!(window.contains(t(12, 0)));
        clock.set_time(13, 0);
        assert!(!window.contains(t(12, 0)));
    }

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::at(23, 50);
        clock.advance(ChronoDuration::minutes(20));
        assert_eq!(clock.time_of_day(), t(0, 10));
    }
}
