//! Weekly generation schedule.
//!
//! The simulator first produces the week that began seven days ago, then
//! produces each following week once it has fully elapsed.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

/// Tracks which week was generated last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekSchedule {
    current_week_start: DateTime<Utc>,
}

impl WeekSchedule {
    /// Start with the week beginning at UTC midnight seven days before `now`.
    pub fn starting(now: DateTime<Utc>) -> Self {
        let today = midnight(now);
        Self {
            current_week_start: today.checked_sub_signed(week()).unwrap_or(today),
        }
    }

    /// Start of the most recently generated week.
    pub const fn current_week_start(&self) -> DateTime<Utc> {
        self.current_week_start
    }

    /// Move to the next week if it has fully elapsed by `now`.
    ///
    /// Returns the new week start when the schedule advanced.
    pub fn advance_if_due(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = self.current_week_start.checked_add_signed(week())?;
        let next_end = next.checked_add_signed(week())?;
        if midnight(now) >= next_end {
            self.current_week_start = next;
            Some(next)
        } else {
            None
        }
    }
}

fn week() -> TimeDelta {
    TimeDelta::days(7)
}

fn midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}
