// crates/statecraft-query/src/buckets.rs
// ============================================================================
// Module: Calendar Buckets
// Description: Calendar truncation for temporal filters and aggregations.
// Purpose: Map timestamps onto hour/day/week/month bucket starts in UTC.
// Dependencies: statecraft-core, time
// ============================================================================

//! ## Overview
//! Bucket starts are computed on the proleptic Gregorian calendar in UTC:
//! hours truncate minutes, days truncate hours, weeks start on Monday, and
//! months truncate to the first. Timestamps outside the representable
//! calendar range fall back to the epoch bucket rather than failing the
//! aggregation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::Duration as CalendarDuration;
use time::OffsetDateTime;
use time::Time;

use statecraft_core::Timestamp;

// ============================================================================
// SECTION: Periods
// ============================================================================

/// Aggregation period for time-bucketed statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    /// Calendar hour.
    Hour,
    /// Calendar day.
    Day,
    /// Calendar week starting Monday.
    Week,
    /// Calendar month.
    Month,
}

// ============================================================================
// SECTION: Truncation
// ============================================================================

/// Converts a timestamp into calendar time, clamping unrepresentable
/// values to the epoch.
fn to_calendar(at: Timestamp) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(at.as_unix_millis()) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Converts calendar time back into a timestamp.
fn to_timestamp(at: OffsetDateTime) -> Timestamp {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(0))
}

/// Returns the start of the bucket containing `at` for `period`.
#[must_use]
pub fn bucket_start(at: Timestamp, period: Period) -> Timestamp {
    let calendar = to_calendar(at);
    let date = calendar.date();
    let truncated = match period {
        Period::Hour => calendar
            .replace_time(Time::from_hms(calendar.hour(), 0, 0).unwrap_or(Time::MIDNIGHT)),
        Period::Day => calendar.replace_time(Time::MIDNIGHT),
        Period::Week => {
            let days_from_monday = i64::from(date.weekday().number_days_from_monday());
            calendar.replace_time(Time::MIDNIGHT)
                - CalendarDuration::days(days_from_monday)
        }
        Period::Month => {
            let first = date.replace_day(1).unwrap_or(date);
            calendar.replace_date(first).replace_time(Time::MIDNIGHT)
        }
    };
    to_timestamp(truncated)
}

/// Returns the start of the calendar day containing `at`.
#[must_use]
pub fn day_start(at: Timestamp) -> Timestamp {
    bucket_start(at, Period::Day)
}

/// Returns the exclusive end of the calendar day containing `at`.
#[must_use]
pub fn day_end(at: Timestamp) -> Timestamp {
    to_timestamp(to_calendar(day_start(at)) + CalendarDuration::days(1))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use statecraft_core::Timestamp;

    use super::Period;
    use super::bucket_start;
    use super::day_end;
    use super::day_start;

    /// 2023-11-14T22:13:20Z.
    const SAMPLE: i64 = 1_700_000_000_000;

    #[test]
    fn hour_buckets_truncate_minutes() {
        let bucket = bucket_start(Timestamp::from_unix_millis(SAMPLE), Period::Hour);
        // 2023-11-14T22:00:00Z.
        assert_eq!(bucket.as_unix_millis(), 1_699_999_200_000);
    }

    #[test]
    fn day_buckets_truncate_hours() {
        let bucket = bucket_start(Timestamp::from_unix_millis(SAMPLE), Period::Day);
        // 2023-11-14T00:00:00Z.
        assert_eq!(bucket.as_unix_millis(), 1_699_920_000_000);
    }

    #[test]
    fn week_buckets_start_on_monday() {
        let bucket = bucket_start(Timestamp::from_unix_millis(SAMPLE), Period::Week);
        // 2023-11-13T00:00:00Z was a Monday.
        assert_eq!(bucket.as_unix_millis(), 1_699_833_600_000);
    }

    #[test]
    fn month_buckets_start_on_the_first() {
        let bucket = bucket_start(Timestamp::from_unix_millis(SAMPLE), Period::Month);
        // 2023-11-01T00:00:00Z.
        assert_eq!(bucket.as_unix_millis(), 1_698_796_800_000);
    }

    #[test]
    fn day_bounds_bracket_the_timestamp() {
        let at = Timestamp::from_unix_millis(SAMPLE);
        assert!(day_start(at) <= at);
        assert!(at < day_end(at));
    }
}
