//! Deterministic time helpers

use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};
use janitor_common::FixedClock;
use std::sync::Arc;

/// A fixed clock starting at `2024-03-04T12:00:00Z` (a Monday).
pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(weekday_noon(Weekday::Mon)))
}

/// Noon UTC on the given weekday of the week starting Monday 2024-03-04.
pub fn weekday_noon(day: Weekday) -> DateTime<Utc> {
    let monday = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
    monday + Duration::days(i64::from(day.num_days_from_monday()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use janitor_common::Clock;

    #[test]
    fn test_weekday_noon() {
        assert_eq!(weekday_noon(Weekday::Mon).weekday(), Weekday::Mon);
        assert_eq!(weekday_noon(Weekday::Sat).weekday(), Weekday::Sat);
    }

    #[test]
    fn test_fixed_clock_starts_monday() {
        assert_eq!(fixed_clock().now().weekday(), Weekday::Mon);
    }
}
