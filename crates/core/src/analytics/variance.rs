use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{business_day_count, logged_hours, percent_of, round_hours};
use crate::domain::worklog::{DateRange, Worklog};

/// Planned-versus-actual comparison for one project, one user, or everyone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceReport {
    pub date_range: DateRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_account_id: Option<String>,
    pub working_days: u32,
    pub expected_hours: f64,
    pub actual_hours: f64,
    pub variance: f64,
    pub variance_percent: i64,
    pub daily_breakdown: BTreeMap<NaiveDate, f64>,
    pub average_hours_per_day: f64,
}

pub fn analyze_variance(
    range: DateRange,
    project_key: Option<&str>,
    user_account_id: Option<&str>,
    worklogs: &[Worklog],
    hours_per_day: f64,
) -> VarianceReport {
    let working_days = business_day_count(range.from, range.to);
    let expected_hours = f64::from(working_days) * hours_per_day;
    let actual_hours = logged_hours(worklogs);
    let variance = actual_hours - expected_hours;

    let mut daily_breakdown = BTreeMap::new();
    for worklog in worklogs {
        *daily_breakdown.entry(worklog.start_date).or_insert(0.0) += worklog.hours();
    }
    for hours in daily_breakdown.values_mut() {
        *hours = round_hours(*hours);
    }

    let average_hours_per_day = if working_days > 0 {
        round_hours(actual_hours / f64::from(working_days))
    } else {
        0.0
    };

    VarianceReport {
        date_range: range,
        project_key: project_key.map(str::to_string),
        user_account_id: user_account_id.map(str::to_string),
        working_days,
        expected_hours: round_hours(expected_hours),
        actual_hours: round_hours(actual_hours),
        variance: round_hours(variance),
        variance_percent: percent_of(variance, expected_hours),
        daily_breakdown,
        average_hours_per_day,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::analyze_variance;
    use crate::domain::worklog::{DateRange, Worklog};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
    }

    fn worklog(id: u64, day: u32, hours: u64) -> Worklog {
        Worklog {
            id,
            issue_key: "OPS-1".to_string(),
            project_key: "OPS".to_string(),
            author_account_id: "acc-1".to_string(),
            start_date: date(day),
            time_spent_seconds: hours * 3600,
            description: String::new(),
        }
    }

    #[test]
    fn under_logged_week_reports_negative_variance() {
        let logs = vec![worklog(1, 10, 6), worklog(2, 10, 2), worklog(3, 11, 8), worklog(4, 12, 4)];
        let report = analyze_variance(
            DateRange::new(date(10), date(14)),
            Some("OPS"),
            None,
            &logs,
            8.0,
        );

        assert_eq!(report.working_days, 5);
        assert_eq!(report.expected_hours, 40.0);
        assert_eq!(report.actual_hours, 20.0);
        assert_eq!(report.variance, -20.0);
        assert_eq!(report.variance_percent, -50);
        assert_eq!(report.average_hours_per_day, 4.0);
        assert_eq!(report.daily_breakdown.get(&date(10)), Some(&8.0));
        assert_eq!(report.daily_breakdown.len(), 3);
        assert_eq!(report.project_key.as_deref(), Some("OPS"));
    }

    #[test]
    fn weekend_range_has_zero_expected_and_zero_percent() {
        let report = analyze_variance(
            DateRange::new(date(8), date(9)),
            None,
            Some("acc-1"),
            &[worklog(1, 8, 3)],
            8.0,
        );

        assert_eq!(report.expected_hours, 0.0);
        assert_eq!(report.variance, 3.0);
        assert_eq!(report.variance_percent, 0);
        assert_eq!(report.average_hours_per_day, 0.0);
    }

    #[test]
    fn breakdown_serializes_with_iso_date_keys() {
        let report = analyze_variance(
            DateRange::new(date(10), date(10)),
            None,
            None,
            &[worklog(1, 10, 8)],
            8.0,
        );

        let json = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(json["dailyBreakdown"]["2025-03-10"], 8.0);
        assert!(json.get("projectKey").is_none());
    }
}
