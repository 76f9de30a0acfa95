use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Local, Timelike};

use crate::time::TimeOfDay;

/// Source of the current time of day, truncated to the minute.
pub trait Clock {
    fn now(&self) -> TimeOfDay;
}

/// Local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeOfDay {
        let now = Local::now();
        TimeOfDay::new(now.hour(), now.minute()).unwrap_or(TimeOfDay::MIDNIGHT)
    }
}

/// Simulated clock for driving a scheduler without waiting on real time.
///
/// Clones share the same reading, so a test can keep one handle and give
/// the other to the scheduler.
#[derive(Debug, Clone)]
pub struct ManualClock {
    minute_of_day: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start: TimeOfDay) -> Self {
        Self {
            minute_of_day: Arc::new(AtomicU32::new(start.minute_of_day())),
        }
    }

    pub fn set(&self, time: TimeOfDay) {
        self.minute_of_day
            .store(time.minute_of_day(), Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: u32) {
        self.set(self.now().plus_minutes(minutes));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeOfDay {
        TimeOfDay::MIDNIGHT.plus_minutes(self.minute_of_day.load(Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> TimeOfDay {
        (**self).now()
    }
}
