use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{business_day_count, percent_of, round_hours};
use crate::domain::worklog::DateRange;
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityScope {
    Team,
    User,
    Project,
}

impl CapacityScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::User => "user",
            Self::Project => "project",
        }
    }

    /// Headcount that contributes capacity. Projects have no roster of their
    /// own, so they never contribute capacity.
    pub fn member_count(&self, team_size: usize) -> u32 {
        match self {
            Self::Team => team_size as u32,
            Self::User => 1,
            Self::Project => 0,
        }
    }
}

impl FromStr for CapacityScope {
    type Err = ApplicationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "team" => Ok(Self::Team),
            "user" => Ok(Self::User),
            "project" => Ok(Self::Project),
            other => Err(ApplicationError::Validation(format!(
                "unsupported capacity scope `{other}` (expected team|user|project)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySummary {
    pub scope: CapacityScope,
    pub scope_id: String,
    pub date_range: DateRange,
    pub working_days: u32,
    pub total_capacity_hours: f64,
    pub logged_hours: f64,
    pub available_hours: f64,
    pub utilization_percent: i64,
    pub member_count: u32,
}

pub fn summarize_capacity(
    scope: CapacityScope,
    scope_id: &str,
    range: DateRange,
    team_size: usize,
    logged_hours: f64,
    hours_per_day: f64,
) -> CapacitySummary {
    let working_days = business_day_count(range.from, range.to);
    let member_count = scope.member_count(team_size);
    let total_capacity_hours = f64::from(working_days) * hours_per_day * f64::from(member_count);

    CapacitySummary {
        scope,
        scope_id: scope_id.to_string(),
        date_range: range,
        working_days,
        total_capacity_hours: round_hours(total_capacity_hours),
        logged_hours: round_hours(logged_hours),
        available_hours: round_hours(total_capacity_hours - logged_hours),
        utilization_percent: percent_of(logged_hours, total_capacity_hours),
        member_count,
    }
}

/// Hours one team member logged in the window under analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberLoad {
    pub account_id: String,
    pub display_name: String,
    pub team_id: u64,
    pub team_name: String,
    pub logged_hours: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableResource {
    pub account_id: String,
    pub display_name: String,
    pub team_id: u64,
    pub team_name: String,
    pub total_capacity: f64,
    pub logged_hours: f64,
    pub available_hours: f64,
    pub utilization_percent: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub date_range: DateRange,
    pub minimum_hours_required: f64,
    pub resources_found: usize,
    pub resources: Vec<AvailableResource>,
}

pub fn find_available_resources(
    range: DateRange,
    minimum_hours_available: f64,
    hours_per_day: f64,
    loads: &[MemberLoad],
) -> AvailabilityReport {
    let capacity_per_person = f64::from(business_day_count(range.from, range.to)) * hours_per_day;

    let mut resources: Vec<AvailableResource> = loads
        .iter()
        .filter_map(|load| {
            let available_hours = capacity_per_person - load.logged_hours;
            (available_hours >= minimum_hours_available).then(|| AvailableResource {
                account_id: load.account_id.clone(),
                display_name: load.display_name.clone(),
                team_id: load.team_id,
                team_name: load.team_name.clone(),
                total_capacity: round_hours(capacity_per_person),
                logged_hours: round_hours(load.logged_hours),
                available_hours: round_hours(available_hours),
                utilization_percent: percent_of(load.logged_hours, capacity_per_person),
            })
        })
        .collect();

    resources.sort_by(|left, right| right.available_hours.total_cmp(&left.available_hours));

    AvailabilityReport {
        date_range: range,
        minimum_hours_required: minimum_hours_available,
        resources_found: resources.len(),
        resources,
    }
}
