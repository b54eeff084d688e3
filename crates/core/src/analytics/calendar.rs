use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::domain::worklog::DateRange;

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Inclusive count of Monday–Friday dates in `from..=to`; zero when the range
/// is inverted.
pub fn business_day_count(from: NaiveDate, to: NaiveDate) -> u32 {
    if from > to {
        return 0;
    }

    let mut count = 0;
    for date in from.iter_days() {
        if date > to {
            break;
        }
        if is_business_day(date) {
            count += 1;
        }
    }
    count
}

/// Monday through Friday of the work week `today` belongs to. A Sunday rolls
/// forward to the week that starts the next day.
pub fn work_week_of(today: NaiveDate) -> DateRange {
    let days_since_sunday = i64::from(today.weekday().num_days_from_sunday());
    let monday = today - Duration::days(days_since_sunday - 1);
    DateRange::new(monday, monday + Duration::days(4))
}

/// The most recent `periods` work weeks ending with the current one, oldest first.
pub fn recent_work_weeks(today: NaiveDate, periods: u32) -> Vec<DateRange> {
    let current = work_week_of(today);
    (0..periods)
        .rev()
        .map(|weeks_back| {
            let offset = Duration::weeks(i64::from(weeks_back));
            DateRange::new(current.from - offset, current.to - offset)
        })
        .collect()
}

/// `days` calendar days back from `today`, inclusive of both ends.
pub fn trailing_window(today: NaiveDate, days: i64) -> DateRange {
    DateRange::new(today - Duration::days(days), today)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{business_day_count, recent_work_weeks, trailing_window, work_week_of};

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).expect("valid date")
    }

    #[test]
    fn single_weekend_day_counts_zero() {
        // 2025-03-08 is a Saturday, 2025-03-09 a Sunday.
        assert_eq!(business_day_count(date(3, 8), date(3, 8)), 0);
        assert_eq!(business_day_count(date(3, 9), date(3, 9)), 0);
    }

    #[test]
    fn single_monday_counts_one() {
        assert_eq!(business_day_count(date(3, 10), date(3, 10)), 1);
    }

    #[test]
    fn full_weeks_count_five_per_week() {
        assert_eq!(business_day_count(date(3, 3), date(3, 7)), 5);
        assert_eq!(business_day_count(date(3, 1), date(3, 31)), 21);
    }

    #[test]
    fn inverted_range_counts_zero() {
        assert_eq!(business_day_count(date(3, 7), date(3, 3)), 0);
    }

    #[test]
    fn work_week_spans_monday_to_friday() {
        let wednesday = work_week_of(date(3, 12));
        assert_eq!(wednesday.from, date(3, 10));
        assert_eq!(wednesday.to, date(3, 14));

        let saturday = work_week_of(date(3, 15));
        assert_eq!(saturday.from, date(3, 10));

        let sunday = work_week_of(date(3, 16));
        assert_eq!(sunday.from, date(3, 17));
    }

    #[test]
    fn recent_weeks_are_oldest_first_and_end_with_current_week() {
        let weeks = recent_work_weeks(date(3, 12), 4);

        assert_eq!(weeks.len(), 4);
        assert_eq!(weeks[0].from, date(2, 17));
        assert_eq!(weeks[3].from, date(3, 10));
        assert!(weeks.windows(2).all(|pair| pair[0].from < pair[1].from));
    }

    #[test]
    fn trailing_window_is_inclusive() {
        let window = trailing_window(date(3, 31), 30);
        assert_eq!(window.from, date(3, 1));
        assert_eq!(window.to, date(3, 31));
    }
}
