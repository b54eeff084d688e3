use serde::{Deserialize, Serialize};

use super::{business_day_count, percent_of, round_hours, MemberLoad};
use crate::domain::worklog::DateRange;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverAllocatedResource {
    pub account_id: String,
    pub display_name: String,
    pub team_id: u64,
    pub team_name: String,
    pub logged_hours: f64,
    pub capacity: f64,
    pub utilization_percent: i64,
    pub over_by: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverAllocationReport {
    pub date_range: DateRange,
    pub threshold: f64,
    pub over_allocated_count: usize,
    pub resources: Vec<OverAllocatedResource>,
}

/// Members whose reported utilization strictly exceeds `threshold`, most
/// over-allocated first. The comparison uses the reported (rounded) percent so
/// no returned entry ever shows a utilization at or below the threshold.
pub fn detect_over_allocation(
    range: DateRange,
    threshold: f64,
    hours_per_day: f64,
    loads: &[MemberLoad],
) -> OverAllocationReport {
    let capacity = f64::from(business_day_count(range.from, range.to)) * hours_per_day;

    let mut resources: Vec<OverAllocatedResource> = loads
        .iter()
        .filter_map(|load| {
            let utilization_percent = percent_of(load.logged_hours, capacity);
            (utilization_percent as f64 > threshold).then(|| OverAllocatedResource {
                account_id: load.account_id.clone(),
                display_name: load.display_name.clone(),
                team_id: load.team_id,
                team_name: load.team_name.clone(),
                logged_hours: round_hours(load.logged_hours),
                capacity,
                utilization_percent,
                over_by: round_hours(load.logged_hours - capacity),
            })
        })
        .collect();

    resources.sort_by(|left, right| right.utilization_percent.cmp(&left.utilization_percent));

    OverAllocationReport {
        date_range: range,
        threshold,
        over_allocated_count: resources.len(),
        resources,
    }
}
