pub mod analytics;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fixtures;
pub mod insights;
pub mod sources;

pub use chrono;

pub use analytics::{
    AvailabilityReport, CapacityScope, CapacitySummary, MemberLoad, OverAllocationReport,
    TrendScope, UtilizationTrend, VarianceReport,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::insight::{DashboardInsights, Insight, InsightSeverity, InsightType};
pub use domain::worklog::DateRange;
pub use errors::{ApplicationError, InterfaceError, SourceError};
pub use fixtures::InMemoryWorkspace;
pub use insights::DashboardInsightsBuilder;
pub use sources::{ProjectDirectory, TeamDirectory, WorklogSource};
