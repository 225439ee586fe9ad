//! Fire-time computation and the clock the scheduler polls.

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use std::time::Duration;

/// When a recurring job should fire.
pub trait Trigger: Send {
    /// First fire instant strictly after `after`.
    fn next_fire_time(&self, after: NaiveDateTime) -> NaiveDateTime;

    /// True if a fire instant lies in `(last_check, now]`.
    fn is_due(&self, last_check: NaiveDateTime, now: NaiveDateTime) -> bool {
        self.next_fire_time(last_check) <= now
    }
}

/// Fires once a day at a fixed local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    fire_at: NaiveTime,
}

impl DailyTrigger {
    pub fn new(fire_at: NaiveTime) -> Self {
        Self { fire_at }
    }

    pub fn fire_at(&self) -> NaiveTime {
        self.fire_at
    }

    /// Today's fire instant for the date of `now`.
    pub fn fire_time_on(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.date().and_time(self.fire_at)
    }
}

impl Trigger for DailyTrigger {
    fn next_fire_time(&self, after: NaiveDateTime) -> NaiveDateTime {
        let today = self.fire_time_on(after);
        if today > after {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }
}

/// Source of local wall-clock time. Swapped for a manual clock in tests.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
    fn sleep(&self, duration: Duration);
}

/// Local system time and a real thread sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
