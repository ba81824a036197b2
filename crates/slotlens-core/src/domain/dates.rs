//! Practice-local calendar derivation.
//!
//! All date components (civil date, weekday index, wall-clock time) are
//! derived in the fixed practice zone. Weekday indices use 0 = Sunday ..
//! 6 = Saturday, matching the DAY_OF_WEEK condition values.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::types::TimeOfDay;

/// The fixed practice-local zone used for every date-component extraction.
pub const PRACTICE_TZ: Tz = chrono_tz::Europe::Berlin;

/// The practice-local civil date of an instant.
pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&PRACTICE_TZ).date_naive()
}

/// The practice-local weekday of an instant, 0 = Sunday .. 6 = Saturday.
pub fn local_weekday(instant: DateTime<Utc>) -> u8 {
    instant.with_timezone(&PRACTICE_TZ).weekday().num_days_from_sunday() as u8
}

/// The weekday index of a civil date, 0 = Sunday .. 6 = Saturday.
pub fn weekday_of(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// The practice-local wall-clock time of an instant, truncated to minutes.
pub fn local_time_of_day(instant: DateTime<Utc>) -> TimeOfDay {
    let local = instant.with_timezone(&PRACTICE_TZ);
    TimeOfDay::from_minutes((local.hour() * 60 + local.minute()) as u16)
        .unwrap_or(TimeOfDay::MIDNIGHT)
}

/// Resolves practice-local wall time on a civil date to a UTC instant.
///
/// On the ambiguous fall-back hour the earlier instant wins; inside the
/// spring-forward gap the wall time is shifted past the gap hour by hour
/// until it resolves.
pub fn local_instant(date: NaiveDate, time: TimeOfDay) -> DateTime<Utc> {
    let mut naive = date
        .and_hms_opt(u32::from(time.hour()), u32::from(time.minute()), 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));
    loop {
        match PRACTICE_TZ.from_local_datetime(&naive) {
            chrono::LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            chrono::LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            chrono::LocalResult::None => {
                naive += chrono::Duration::hours(1);
            }
        }
    }
}

/// Today's civil date in the practice zone.
pub fn today_local(now: DateTime<Utc>) -> NaiveDate {
    local_date(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tod(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn winter_local_instant_is_utc_plus_one() {
        // 2026-01-05 is a Monday; Berlin is at UTC+1 in January.
        let instant = local_instant(date(2026, 1, 5), tod("08:00"));
        assert_eq!(instant.to_rfc3339(), "2026-01-05T07:00:00+00:00");
        assert_eq!(local_time_of_day(instant), tod("08:00"));
        assert_eq!(local_weekday(instant), 1);
    }

    #[test]
    fn summer_local_instant_is_utc_plus_two() {
        let instant = local_instant(date(2026, 7, 1), tod("08:00"));
        assert_eq!(instant.to_rfc3339(), "2026-07-01T06:00:00+00:00");
        assert_eq!(local_date(instant), date(2026, 7, 1));
    }

    #[test]
    fn local_date_respects_midnight_boundary() {
        // 23:30 UTC on Jan 5 is already Jan 6 in Berlin.
        let instant = "2026-01-05T23:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(local_date(instant), date(2026, 1, 6));
    }

    #[test]
    fn spring_forward_gap_resolves_past_the_gap() {
        // On 2026-03-29 Berlin skips 02:00..03:00.
        let instant = local_instant(date(2026, 3, 29), tod("02:30"));
        assert_eq!(local_date(instant), date(2026, 3, 29));
        assert!(local_time_of_day(instant) >= tod("03:00"));
    }

    #[test]
    fn weekday_uses_sunday_zero() {
        assert_eq!(weekday_of(date(2026, 1, 4)), 0); // Sunday
        assert_eq!(weekday_of(date(2026, 1, 5)), 1); // Monday
        assert_eq!(weekday_of(date(2026, 1, 10)), 6); // Saturday
    }
}
