//! Capacity Analytics Engine
//!
//! Deterministic computations over time-tracking data that has already been
//! fetched from the collaborators. Nothing here performs I/O; callers gather
//! worklogs and memberships, tolerate per-member fetch failures, and pass the
//! results in.
//!
//! Conventions shared by every report:
//! - capacity is business days (Monday–Friday) × hours per day × members
//! - reported hours are rounded to one decimal place
//! - percentages are rounded to whole numbers and are `0` whenever the
//!   denominator is zero

pub mod allocation;
pub mod calendar;
pub mod capacity;
pub mod trend;
pub mod variance;

pub use allocation::{detect_over_allocation, OverAllocatedResource, OverAllocationReport};
pub use calendar::{business_day_count, recent_work_weeks, trailing_window, work_week_of};
pub use capacity::{
    find_available_resources, summarize_capacity, AvailabilityReport, AvailableResource,
    CapacityScope, CapacitySummary, MemberLoad,
};
pub use trend::{summarize_trend, TrendScope, UtilizationTrend, WeekSample, WeeklyUtilization};
pub use variance::{analyze_variance, VarianceReport};

use crate::domain::worklog::Worklog;

pub const DEFAULT_HOURS_PER_DAY: f64 = 8.0;
pub const DEFAULT_OVER_ALLOCATION_THRESHOLD: f64 = 100.0;
pub const DEFAULT_TREND_PERIODS: u32 = 4;
pub const DEFAULT_VARIANCE_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_MINIMUM_HOURS_AVAILABLE: f64 = 8.0;

pub fn round_hours(hours: f64) -> f64 {
    (hours * 10.0).round() / 10.0
}

pub fn percent_of(numerator: f64, denominator: f64) -> i64 {
    if denominator <= 0.0 {
        return 0;
    }
    (numerator / denominator * 100.0).round() as i64
}

pub fn logged_hours(worklogs: &[Worklog]) -> f64 {
    worklogs.iter().map(Worklog::hours).sum()
}

#[cfg(test)]
mod tests {
    use super::{percent_of, round_hours};

    #[test]
    fn percent_of_zero_denominator_is_zero() {
        assert_eq!(percent_of(12.0, 0.0), 0);
        assert_eq!(percent_of(0.0, 0.0), 0);
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent_of(1.0, 8.0), 13);
        assert_eq!(percent_of(44.0, 40.0), 110);
    }

    #[test]
    fn hours_round_to_one_decimal() {
        assert_eq!(round_hours(7.349), 7.3);
        assert_eq!(round_hours(7.36), 7.4);
    }
}
