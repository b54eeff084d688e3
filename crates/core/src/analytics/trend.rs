use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{percent_of, round_hours};
use crate::domain::insight::TrendDirection;
use crate::errors::ApplicationError;

/// Utilization movement (in percentage points) beyond which a trend stops
/// being reported as stable.
pub const TREND_SENSITIVITY_POINTS: i64 = 5;

pub const WORKING_DAYS_PER_WEEK: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendScope {
    Team,
    Project,
}

impl TrendScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::Project => "project",
        }
    }
}

impl FromStr for TrendScope {
    type Err = ApplicationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "team" => Ok(Self::Team),
            "project" => Ok(Self::Project),
            other => Err(ApplicationError::Validation(format!(
                "unsupported trend scope `{other}` (expected team|project)"
            ))),
        }
    }
}

/// Raw totals for one sampled Monday–Friday week.
#[derive(Clone, Debug, PartialEq)]
pub struct WeekSample {
    pub week_of: NaiveDate,
    pub logged_hours: f64,
    pub capacity_hours: f64,
}

impl WeekSample {
    /// A team week with `member_count` people at `hours_per_day`. Project
    /// weeks pass zero members and therefore carry no capacity.
    pub fn new(week_of: NaiveDate, logged_hours: f64, member_count: usize, hours_per_day: f64) -> Self {
        let capacity_hours = member_count as f64 * WORKING_DAYS_PER_WEEK * hours_per_day;
        Self { week_of, logged_hours, capacity_hours }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyUtilization {
    pub week_of: NaiveDate,
    pub logged_hours: f64,
    pub capacity: f64,
    pub utilization: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationTrend {
    pub scope: TrendScope,
    pub scope_id: String,
    pub periods: usize,
    pub trend: TrendDirection,
    pub average_utilization: i64,
    pub weekly_data: Vec<WeeklyUtilization>,
}

/// Samples must be ordered oldest week first.
pub fn summarize_trend(scope: TrendScope, scope_id: &str, samples: &[WeekSample]) -> UtilizationTrend {
    let weekly_data: Vec<WeeklyUtilization> = samples
        .iter()
        .map(|sample| WeeklyUtilization {
            week_of: sample.week_of,
            logged_hours: round_hours(sample.logged_hours),
            capacity: round_hours(sample.capacity_hours),
            utilization: percent_of(sample.logged_hours, sample.capacity_hours),
        })
        .collect();

    let trend = match (weekly_data.first(), weekly_data.last()) {
        (Some(first), Some(last)) if weekly_data.len() >= 2 => {
            let diff = last.utilization - first.utilization;
            if diff > TREND_SENSITIVITY_POINTS {
                TrendDirection::Up
            } else if diff < -TREND_SENSITIVITY_POINTS {
                TrendDirection::Down
            } else {
                TrendDirection::Stable
            }
        }
        _ => TrendDirection::Stable,
    };

    let average_utilization = if weekly_data.is_empty() {
        0
    } else {
        let total: i64 = weekly_data.iter().map(|week| week.utilization).sum();
        (total as f64 / weekly_data.len() as f64).round() as i64
    };

    UtilizationTrend {
        scope,
        scope_id: scope_id.to_string(),
        periods: weekly_data.len(),
        trend,
        average_utilization,
        weekly_data,
    }
}
