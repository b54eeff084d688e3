//! Dashboard insight rules.
//!
//! The rules only see finished analytics reports. Gathering those reports
//! (and tolerating failures while doing so) belongs to the caller, which feeds
//! whatever it managed to compute into [`DashboardInsightsBuilder`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::analytics::{CapacitySummary, OverAllocationReport};
use crate::domain::directory::Team;
use crate::domain::insight::{
    AffectedEntity, DashboardInsights, EntityKind, Insight, InsightMetric, InsightSeverity,
    InsightSummary, InsightType, TrendDirection,
};

pub const UNDER_UTILIZATION_THRESHOLD: i64 = 70;
pub const CAPACITY_AVAILABLE_THRESHOLD: i64 = 80;
pub const CRITICAL_OVER_ALLOCATION_COUNT: usize = 3;
pub const MAX_AFFECTED_ENTITIES: usize = 5;
pub const MAX_SAMPLED_TEAMS: usize = 5;

#[derive(Debug)]
pub struct DashboardInsightsBuilder {
    now: DateTime<Utc>,
    insights: Vec<Insight>,
    total_over_allocated: u32,
    total_under_utilized: u32,
    utilization_total: i64,
    utilization_samples: u32,
    critical_alerts: u32,
}

impl DashboardInsightsBuilder {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            insights: Vec::new(),
            total_over_allocated: 0,
            total_under_utilized: 0,
            utilization_total: 0,
            utilization_samples: 0,
            critical_alerts: 0,
        }
    }

    pub fn record_over_allocation(&mut self, report: &OverAllocationReport) {
        let count = report.over_allocated_count;
        self.total_over_allocated = count as u32;
        if count == 0 {
            return;
        }

        let severity = if count > CRITICAL_OVER_ALLOCATION_COUNT {
            self.critical_alerts += 1;
            InsightSeverity::Critical
        } else {
            InsightSeverity::Warning
        };

        let affected_entities = report
            .resources
            .iter()
            .take(MAX_AFFECTED_ENTITIES)
            .map(|resource| AffectedEntity {
                kind: EntityKind::User,
                id: resource.account_id.clone(),
                name: resource.display_name.clone(),
            })
            .collect();

        self.insights.push(Insight {
            id: Uuid::new_v4().to_string(),
            insight_type: InsightType::OverAllocation,
            severity,
            title: "Over-Allocated Resources".to_string(),
            description: format!(
                "{count} team member(s) are allocated over {}% capacity this week.",
                report.threshold
            ),
            metric: Some(InsightMetric {
                value: count as f64,
                unit: "resources".to_string(),
                trend: Some(TrendDirection::Up),
            }),
            affected_entities,
            recommendation: Some(
                "Consider redistributing work or adjusting deadlines for over-allocated team members."
                    .to_string(),
            ),
            timestamp: self.now,
        });
    }

    /// Every sampled team contributes to the average; only staffed teams below
    /// the threshold produce an under-utilization insight.
    pub fn record_team_capacity(&mut self, team: &Team, summary: &CapacitySummary) {
        let utilization = summary.utilization_percent;
        self.utilization_total += utilization;
        self.utilization_samples += 1;

        if utilization >= UNDER_UTILIZATION_THRESHOLD || summary.member_count == 0 {
            return;
        }

        self.total_under_utilized += 1;
        self.insights.push(Insight {
            id: Uuid::new_v4().to_string(),
            insight_type: InsightType::UnderUtilization,
            severity: InsightSeverity::Info,
            title: format!("Low Utilization: {}", team.name),
            description: format!(
                "Team \"{}\" has {} hours of available capacity ({}% unused).",
                team.name,
                summary.available_hours,
                100 - utilization
            ),
            metric: Some(InsightMetric {
                value: utilization as f64,
                unit: "%".to_string(),
                trend: Some(TrendDirection::Stable),
            }),
            affected_entities: vec![AffectedEntity {
                kind: EntityKind::Team,
                id: team.id.to_string(),
                name: team.name.clone(),
            }],
            recommendation: Some("This team has capacity for additional work assignments.".to_string()),
            timestamp: self.now,
        });
    }

    pub fn average_utilization(&self) -> i64 {
        if self.utilization_samples == 0 {
            return 0;
        }
        (self.utilization_total as f64 / f64::from(self.utilization_samples)).round() as i64
    }

    pub fn finish(mut self) -> DashboardInsights {
        let avg_utilization = self.average_utilization();

        if avg_utilization < CAPACITY_AVAILABLE_THRESHOLD {
            self.insights.push(Insight {
                id: Uuid::new_v4().to_string(),
                insight_type: InsightType::CapacityAvailable,
                severity: InsightSeverity::Info,
                title: "Capacity Available".to_string(),
                description: format!(
                    "Average team utilization is {avg_utilization}%. There is capacity for new initiatives."
                ),
                metric: Some(InsightMetric {
                    value: (100 - avg_utilization) as f64,
                    unit: "% available".to_string(),
                    trend: None,
                }),
                affected_entities: Vec::new(),
                recommendation: None,
                timestamp: self.now,
            });
        }

        DashboardInsights {
            insights: self.insights,
            summary: InsightSummary {
                total_over_allocated: self.total_over_allocated,
                total_under_utilized: self.total_under_utilized,
                avg_utilization,
                critical_alerts: self.critical_alerts,
            },
            generated_at: self.now,
        }
    }
}
