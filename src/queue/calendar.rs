//! Working calendar used to project queue completion times.
//!
//! Queue processing only happens inside the working window: Monday to Friday,
//! from `start_hour` (inclusive) to `end_hour` (exclusive) local time. The
//! reference definition of "advance by N working minutes" is a minute-by-minute
//! walk:
//!
//! ```text
//! t = now
//! while remaining > 0:
//!     if t is inside the window: remaining -= 1
//!     t += 1 minute
//! return t
//! ```
//!
//! [`WorkingCalendar::advance`] computes the same result in time proportional to
//! the number of calendar days crossed rather than the number of minutes: it
//! consumes whole in-window spans at once and jumps straight over off-window
//! spans to the next window opening. The seconds of `now` are carried through,
//! as they would be by the walk.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

use crate::error::{RegistrarError, Result};

/// Configuration for the working window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// First working hour of the day (local time)
    pub work_start_hour: u32,

    /// Hour at which work stops (local time, exclusive)
    pub work_end_hour: u32,

    /// Offset of local time from UTC, in minutes (e.g. 180 for UTC+3)
    pub utc_offset_minutes: i32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            work_start_hour: 9,
            work_end_hour: 17,
            utc_offset_minutes: 0,
        }
    }
}

/// Weekday working hours in a fixed local offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCalendar {
    start_hour: u32,
    end_hour: u32,
    offset: FixedOffset,
}

impl Default for WorkingCalendar {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            offset: Utc.fix(),
        }
    }
}

impl WorkingCalendar {
    /// Create a calendar with the window `[start_hour, end_hour)` in `offset`.
    ///
    /// # Errors
    /// `ValidationError` unless `start_hour < end_hour <= 24`.
    pub fn new(start_hour: u32, end_hour: u32, offset: FixedOffset) -> Result<Self> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(RegistrarError::ValidationError(format!(
                "invalid working window {}:00-{}:00",
                start_hour, end_hour
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
            offset,
        })
    }

    pub fn from_config(config: &CalendarConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .ok_or_else(|| {
                RegistrarError::ValidationError(format!(
                    "UTC offset of {} minutes is out of range",
                    config.utc_offset_minutes
                ))
            })?;
        Self::new(config.work_start_hour, config.work_end_hour, offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Whether the minute starting at `at` counts as working time.
    pub fn is_working_time(&self, at: DateTime<Utc>) -> bool {
        self.is_working_local(&at.with_timezone(&self.offset))
    }

    fn is_working_local(&self, at: &DateTime<FixedOffset>) -> bool {
        is_working_day(at.date_naive())
            && at.hour() >= self.start_hour
            && at.hour() < self.end_hour
    }

    /// Advance `from` until `minutes` working minutes have elapsed.
    ///
    /// Returns `from` unchanged when `minutes` is zero.
    pub fn advance(&self, from: DateTime<Utc>, minutes: u64) -> DateTime<Utc> {
        let mut remaining = minutes;
        let mut cursor = from.with_timezone(&self.offset);

        while remaining > 0 {
            if self.is_working_local(&cursor) {
                let minute_of_day = cursor.hour() * 60 + cursor.minute();
                let left_in_window = u64::from(self.end_hour * 60 - minute_of_day);
                let step = remaining.min(left_in_window);
                cursor += Duration::minutes(step as i64);
                remaining -= step;
            } else {
                cursor = self.next_window_opening(cursor);
            }
        }

        cursor.with_timezone(&Utc)
    }

    /// First minute tick at or after `cursor` that falls inside a working window,
    /// for a `cursor` that is outside one.
    fn next_window_opening(&self, cursor: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let sub_minute = Duration::seconds(i64::from(cursor.second()))
            + Duration::nanoseconds(i64::from(cursor.nanosecond()));

        let mut date = cursor.date_naive();
        let opens_later_today = is_working_day(date) && cursor.hour() < self.start_hour;
        if !opens_later_today {
            date = next_working_day(date);
        }

        date.and_hms_opt(self.start_hour, 0, 0)
            .and_then(|naive| naive.and_local_timezone(self.offset).single())
            .map(|opening| opening + sub_minute)
            // Unreachable for a validated calendar; stepping one minute still
            // makes progress.
            .unwrap_or_else(|| cursor + Duration::minutes(1))
    }
}

fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn next_working_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_working_day(next) {
        next += Duration::days(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// The minute-by-minute walk that defines correct behaviour.
    fn simulate(calendar: &WorkingCalendar, from: DateTime<Utc>, minutes: u64) -> DateTime<Utc> {
        let mut remaining = minutes;
        let mut t = from;
        while remaining > 0 {
            if calendar.is_working_time(t) {
                remaining -= 1;
            }
            t += Duration::minutes(1);
        }
        t
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    // 2024-06-03 is a Monday, 2024-06-07 a Friday.

    #[test]
    fn test_zero_minutes_is_identity() {
        let calendar = WorkingCalendar::default();
        let saturday_night = utc(2024, 6, 8, 23, 17);
        assert_eq!(calendar.advance(saturday_night, 0), saturday_night);
    }

    #[test]
    fn test_within_one_window() {
        let calendar = WorkingCalendar::default();
        assert_eq!(
            calendar.advance(utc(2024, 6, 3, 9, 0), 15),
            utc(2024, 6, 3, 9, 15)
        );
    }

    #[test]
    fn test_crosses_end_of_day() {
        let calendar = WorkingCalendar::default();
        assert_eq!(
            calendar.advance(utc(2024, 6, 3, 16, 50), 15),
            utc(2024, 6, 4, 9, 5)
        );
    }

    #[test]
    fn test_skips_weekend() {
        let calendar = WorkingCalendar::default();
        assert_eq!(
            calendar.advance(utc(2024, 6, 7, 16, 55), 20),
            utc(2024, 6, 10, 9, 15)
        );
    }

    #[test]
    fn test_starting_before_opening_waits_for_it() {
        let calendar = WorkingCalendar::default();
        assert_eq!(
            calendar.advance(utc(2024, 6, 4, 6, 30), 30),
            utc(2024, 6, 4, 9, 30)
        );
    }

    #[test]
    fn test_ends_exactly_at_close() {
        let calendar = WorkingCalendar::default();
        // The last counted minute is 16:59, so the result is 17:00 the same day.
        assert_eq!(
            calendar.advance(utc(2024, 6, 3, 16, 0), 60),
            utc(2024, 6, 3, 17, 0)
        );
    }

    #[test]
    fn test_seconds_are_carried_through() {
        let calendar = WorkingCalendar::default();
        let from = Utc.with_ymd_and_hms(2024, 6, 3, 16, 59, 30).unwrap();
        assert_eq!(
            calendar.advance(from, 2),
            Utc.with_ymd_and_hms(2024, 6, 4, 9, 1, 30).unwrap()
        );
        assert_eq!(calendar.advance(from, 2), simulate(&calendar, from, 2));
    }

    #[test]
    fn test_local_offset_shifts_window() {
        // UTC+3: the window is 06:00-14:00 UTC.
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let calendar = WorkingCalendar::new(9, 17, offset).unwrap();
        assert!(!calendar.is_working_time(utc(2024, 6, 3, 5, 59)));
        assert!(calendar.is_working_time(utc(2024, 6, 3, 6, 0)));
        assert!(!calendar.is_working_time(utc(2024, 6, 3, 14, 0)));
        assert_eq!(
            calendar.advance(utc(2024, 6, 3, 13, 50), 15),
            utc(2024, 6, 4, 6, 5)
        );
    }

    #[test]
    fn test_offset_can_move_weekday() {
        // 22:00 UTC Sunday is 01:00 Monday in UTC+3.
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let calendar = WorkingCalendar::new(0, 8, offset).unwrap();
        assert!(calendar.is_working_time(utc(2024, 6, 9, 22, 0)));
        assert!(!WorkingCalendar::default().is_working_time(utc(2024, 6, 9, 22, 0)));
    }

    #[test]
    fn test_matches_simulation_across_week() {
        let calendars = [
            WorkingCalendar::default(),
            WorkingCalendar::new(8, 12, FixedOffset::west_opt(5 * 3600).unwrap()).unwrap(),
            WorkingCalendar::new(0, 24, FixedOffset::east_opt(0).unwrap()).unwrap(),
        ];
        let week_start = Utc.with_ymd_and_hms(2024, 6, 7, 0, 0, 42).unwrap();

        for calendar in &calendars {
            // Every 37 minutes across a Friday-to-Tuesday span.
            for step in 0..(4 * 24 * 60 / 37) {
                let from = week_start + Duration::minutes(37 * step);
                for minutes in [0, 1, 14, 15, 59, 60, 90, 480, 1000] {
                    assert_eq!(
                        calendar.advance(from, minutes),
                        simulate(calendar, from, minutes),
                        "from {} plus {} working minutes",
                        from,
                        minutes
                    );
                }
            }
        }
    }

    #[test]
    fn test_invalid_windows_rejected() {
        let utc_offset = FixedOffset::east_opt(0).unwrap();
        assert!(WorkingCalendar::new(17, 9, utc_offset).is_err());
        assert!(WorkingCalendar::new(9, 9, utc_offset).is_err());
        assert!(WorkingCalendar::new(9, 25, utc_offset).is_err());

        let config = CalendarConfig {
            utc_offset_minutes: 24 * 60,
            ..Default::default()
        };
        assert!(WorkingCalendar::from_config(&config).is_err());
    }
}
