use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ApplicationError;

/// Inclusive calendar date range, serialized as `YYYY-MM-DD` bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, ApplicationError> {
        Ok(Self { from: parse_date("dateFrom", from)?, to: parse_date("dateTo", to)? })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApplicationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ApplicationError::Validation(format!("{field} must be a YYYY-MM-DD date, got `{value}`"))
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worklog {
    pub id: u64,
    pub issue_key: String,
    pub project_key: String,
    pub author_account_id: String,
    pub start_date: NaiveDate,
    pub time_spent_seconds: u64,
    #[serde(default)]
    pub description: String,
}

impl Worklog {
    pub fn hours(&self) -> f64 {
        self.time_spent_seconds as f64 / 3600.0
    }
}

/// Filter accepted by [`crate::sources::WorklogSource::worklogs`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorklogQuery {
    pub range: Option<DateRange>,
    pub issue_keys: Vec<String>,
    pub project_keys: Vec<String>,
}

impl WorklogQuery {
    pub fn within(range: DateRange) -> Self {
        Self { range: Some(range), ..Self::default() }
    }

    pub fn for_project(range: DateRange, project_key: impl Into<String>) -> Self {
        Self { range: Some(range), project_keys: vec![project_key.into()], ..Self::default() }
    }

    pub fn matches(&self, worklog: &Worklog) -> bool {
        let in_range = self.range.map(|range| range.contains(worklog.start_date)).unwrap_or(true);
        let issue_ok = self.issue_keys.is_empty() || self.issue_keys.contains(&worklog.issue_key);
        let project_ok =
            self.project_keys.is_empty() || self.project_keys.contains(&worklog.project_key);
        in_range && issue_ok && project_ok
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimesheetStatus {
    Open,
    InReview,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timesheet {
    pub account_id: String,
    pub period: DateRange,
    pub status: TimesheetStatus,
    pub required_seconds: u64,
    pub time_spent_seconds: u64,
}
