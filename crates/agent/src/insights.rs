//! Dashboard insight generation and its TTL cache.
//!
//! The generator goes through the tool registry like the model does, so it
//! sees the same data and the same failure handling. Every sub-computation
//! that fails is logged and left out; generation itself never fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use capplan_core::analytics::{work_week_of, CapacitySummary, OverAllocationReport};
use capplan_core::chrono::{DateTime, Duration, Utc};
use capplan_core::domain::directory::Team;
use capplan_core::insights::MAX_SAMPLED_TEAMS;
use capplan_core::{Clock, DashboardInsights, DashboardInsightsBuilder};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::tools::{ToolName, ToolOutcome, ToolRegistry};

pub const DEFAULT_INSIGHT_TTL_SECS: u64 = 3600;

#[async_trait]
pub trait InsightCache: Send + Sync {
    /// A snapshot stored less than one TTL ago, if any.
    async fn get(&self, key: &str) -> Option<Arc<DashboardInsights>>;

    async fn put(&self, key: &str, insights: Arc<DashboardInsights>);
}

struct CachedInsights {
    stored_at: DateTime<Utc>,
    insights: Arc<DashboardInsights>,
}

pub struct TtlInsightCache {
    entries: RwLock<HashMap<String, CachedInsights>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TtlInsightCache {
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        let ttl = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1_000));
        Self { entries: RwLock::new(HashMap::new()), ttl, clock }
    }
}

#[async_trait]
impl InsightCache for TtlInsightCache {
    async fn get(&self, key: &str) -> Option<Arc<DashboardInsights>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        (self.clock.now() - entry.stored_at < self.ttl).then(|| entry.insights.clone())
    }

    async fn put(&self, key: &str, insights: Arc<DashboardInsights>) {
        let stored_at = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| stored_at - entry.stored_at < self.ttl);
        entries.insert(key.to_string(), CachedInsights { stored_at, insights });
    }
}

pub struct InsightGenerator {
    tools: Arc<ToolRegistry>,
    clock: Arc<dyn Clock>,
}

impl InsightGenerator {
    pub fn new(tools: Arc<ToolRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { tools, clock }
    }

    /// Over-allocation for the current work week plus capacity of up to
    /// five teams, turned into insights.
    pub async fn generate(&self) -> DashboardInsights {
        let now = self.clock.now();
        let week = work_week_of(now.date_naive());
        let window = json!({
            "dateFrom": week.from.to_string(),
            "dateTo": week.to.to_string(),
        });
        let mut builder = DashboardInsightsBuilder::new(now);

        let over_allocation =
            self.tools.execute(ToolName::DetectOverAllocation.as_str(), window.clone()).await;
        match decode::<OverAllocationReport>(&over_allocation) {
            Ok(report) => builder.record_over_allocation(&report),
            Err(error) => warn!(
                event_name = "insights.over_allocation.skipped",
                error = %error,
                "over-allocation check failed"
            ),
        }

        let teams = match decode::<Vec<Team>>(
            &self.tools.execute(ToolName::GetTeams.as_str(), json!({})).await,
        ) {
            Ok(teams) => teams,
            Err(error) => {
                warn!(
                    event_name = "insights.teams.skipped",
                    error = %error,
                    "team lookup failed; no capacity insights"
                );
                Vec::new()
            }
        };

        let sampled = &teams[..teams.len().min(MAX_SAMPLED_TEAMS)];
        let summaries = join_all(sampled.iter().map(|team| {
            let mut input = window.clone();
            input["scope"] = json!("team");
            input["scopeId"] = json!(team.id.to_string());
            self.tools.execute(ToolName::CalculateCapacitySummary.as_str(), input)
        }))
        .await;

        for (team, outcome) in sampled.iter().zip(summaries) {
            match decode::<CapacitySummary>(&outcome) {
                Ok(summary) => builder.record_team_capacity(team, &summary),
                Err(error) => warn!(
                    event_name = "insights.team_capacity.skipped",
                    team_id = team.id,
                    error = %error,
                    "team capacity failed"
                ),
            }
        }

        let insights = builder.finish();
        debug!(
            event_name = "insights.generated",
            insights = insights.insights.len(),
            avg_utilization = insights.summary.avg_utilization,
            "dashboard insights generated"
        );
        insights
    }
}

fn decode<T: DeserializeOwned>(outcome: &ToolOutcome) -> Result<T, String> {
    match (&outcome.data, &outcome.error) {
        (Some(data), _) if outcome.success => {
            T::deserialize(data).map_err(|error| error.to_string())
        }
        (_, Some(error)) => Err(error.clone()),
        _ => Err("tool returned no data".to_string()),
    }
}
