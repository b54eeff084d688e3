//! Tool Dispatcher
//!
//! Every tool the model may call is a [`ToolName`] with a static schema. Raw
//! model input is validated against that schema, decoded into a typed
//! [`ToolRequest`] and dispatched exhaustively to a handler. The registry
//! never lets an error escape: every call ends in a [`ToolOutcome`].

pub mod analytics;
pub mod directory;
pub mod schema;
pub mod worklogs;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use capplan_core::analytics::{CapacityScope, TrendScope};
use capplan_core::chrono::NaiveDate;
use capplan_core::errors::{ApplicationError, SourceError};
use capplan_core::{Clock, InMemoryWorkspace, ProjectDirectory, TeamDirectory, WorklogSource};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::ToolDefinition;
use schema::{FieldSpec, FieldType, InputSchema};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid input for `{tool}`: {message}")]
    InvalidInput { tool: &'static str, message: String },
    #[error(transparent)]
    Collaborator(#[from] SourceError),
    #[error("could not serialize tool output: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ToolError {
    fn invalid(tool: ToolName, message: impl Into<String>) -> Self {
        Self::InvalidInput { tool: tool.as_str(), message: message.into() }
    }
}

impl From<ToolError> for ApplicationError {
    fn from(error: ToolError) -> Self {
        match error {
            ToolError::UnknownTool(name) => Self::Validation(format!("unknown tool `{name}`")),
            ToolError::InvalidInput { tool, message } => {
                Self::Parse { tool: tool.to_string(), message }
            }
            ToolError::Collaborator(source) => Self::Collaborator(source),
            ToolError::Serialization(error) => Self::Validation(error.to_string()),
        }
    }
}

/// Result of one tool execution as fed back to the model and the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }

    /// The value surfaced in traces: the data on success, the message otherwise.
    pub fn payload(&self) -> Value {
        match (&self.data, &self.error) {
            (Some(data), _) if self.success => data.clone(),
            (_, Some(error)) => Value::String(error.clone()),
            _ => Value::Null,
        }
    }

    /// Serialized `tool_result` content sent back to the model.
    pub fn model_content(&self) -> String {
        let body = if self.success {
            self.data.clone().unwrap_or(Value::Null)
        } else {
            json!({ "error": self.error.as_deref().unwrap_or("tool failed") })
        };
        body.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolName {
    GetTeams,
    GetTeamMembers,
    GetUserWorklogs,
    GetWorklogs,
    GetProjects,
    GetProjectEpics,
    SearchIssues,
    GetTimesheets,
    GetTempoAccounts,
    CalculateCapacitySummary,
    FindAvailableResources,
    DetectOverAllocation,
    AnalyzeVariance,
    IdentifyUtilizationTrends,
}

const CAPACITY_SCOPES: &[&str] = &["team", "user", "project"];
const TREND_SCOPES: &[&str] = &["team", "project"];

const DATE_FROM: FieldSpec =
    FieldSpec::required("dateFrom", FieldType::Date, "Start date (YYYY-MM-DD)");
const DATE_TO: FieldSpec = FieldSpec::required("dateTo", FieldType::Date, "End date (YYYY-MM-DD)");

const NO_INPUT: InputSchema = InputSchema::new(&[]);

const TEAM_MEMBERS_SCHEMA: InputSchema =
    InputSchema::new(&[FieldSpec::required("teamId", FieldType::Integer, "The team id")]);

const USER_WORKLOGS_SCHEMA: InputSchema = InputSchema::new(&[
    FieldSpec::required("userAccountId", FieldType::String, "The user's account id"),
    DATE_FROM,
    DATE_TO,
]);

const WORKLOGS_SCHEMA: InputSchema = InputSchema::new(&[
    DATE_FROM,
    DATE_TO,
    FieldSpec::optional("issueKeys", FieldType::StringArray, "Restrict to these issue keys"),
    FieldSpec::optional("projectKeys", FieldType::StringArray, "Restrict to these project keys"),
]);

const PROJECT_EPICS_SCHEMA: InputSchema = InputSchema::new(&[
    FieldSpec::required("projectKey", FieldType::String, "The project key, e.g. OPS"),
    FieldSpec::optional("initiativeOnly", FieldType::Boolean, "Only return initiatives"),
]);

const SEARCH_ISSUES_SCHEMA: InputSchema = InputSchema::new(&[
    FieldSpec::required("jql", FieldType::String, "JQL query"),
    FieldSpec::optional("maxResults", FieldType::Integer, "Maximum results (default 50)"),
]);

const TIMESHEETS_SCHEMA: InputSchema = InputSchema::new(&[
    DATE_FROM,
    DATE_TO,
    FieldSpec::optional("userAccountId", FieldType::String, "Restrict to one user"),
]);

const CAPACITY_SUMMARY_SCHEMA: InputSchema = InputSchema::new(&[
    FieldSpec::required("scope", FieldType::Enum(CAPACITY_SCOPES), "What to summarize"),
    FieldSpec::required("scopeId", FieldType::String, "Team id, user account id or project key"),
    DATE_FROM,
    DATE_TO,
]);

const AVAILABLE_RESOURCES_SCHEMA: InputSchema = InputSchema::new(&[
    DATE_FROM,
    DATE_TO,
    FieldSpec::optional(
        "minimumHoursAvailable",
        FieldType::Number,
        "Minimum available hours required (default 8)",
    ),
    FieldSpec::optional("teamId", FieldType::Integer, "Restrict to one team"),
]);

const OVER_ALLOCATION_SCHEMA: InputSchema = InputSchema::new(&[
    FieldSpec::optional("threshold", FieldType::Number, "Utilization percentage (default 100)"),
    FieldSpec::optional("dateFrom", FieldType::Date, "Start date (default: this Monday)"),
    FieldSpec::optional("dateTo", FieldType::Date, "End date (default: this Friday)"),
]);

const VARIANCE_SCHEMA: InputSchema = InputSchema::new(&[
    FieldSpec::optional("dateFrom", FieldType::Date, "Start date (default: 30 days ago)"),
    FieldSpec::optional("dateTo", FieldType::Date, "End date (default: today)"),
    FieldSpec::optional("projectKey", FieldType::String, "Project to analyze"),
    FieldSpec::optional("userAccountId", FieldType::String, "User to analyze"),
]);

const TRENDS_SCHEMA: InputSchema = InputSchema::new(&[
    FieldSpec::required("scope", FieldType::Enum(TREND_SCOPES), "Team or project"),
    FieldSpec::required("scopeId", FieldType::String, "Team id or project key"),
    FieldSpec::optional("periods", FieldType::Integer, "Number of weeks to sample (default 4)"),
]);

impl ToolName {
    pub const ALL: [ToolName; 14] = [
        Self::GetTeams,
        Self::GetTeamMembers,
        Self::GetUserWorklogs,
        Self::GetWorklogs,
        Self::GetProjects,
        Self::GetProjectEpics,
        Self::SearchIssues,
        Self::GetTimesheets,
        Self::GetTempoAccounts,
        Self::CalculateCapacitySummary,
        Self::FindAvailableResources,
        Self::DetectOverAllocation,
        Self::AnalyzeVariance,
        Self::IdentifyUtilizationTrends,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetTeams => "get_teams",
            Self::GetTeamMembers => "get_team_members",
            Self::GetUserWorklogs => "get_user_worklogs",
            Self::GetWorklogs => "get_worklogs",
            Self::GetProjects => "get_projects",
            Self::GetProjectEpics => "get_project_epics",
            Self::SearchIssues => "search_issues",
            Self::GetTimesheets => "get_timesheets",
            Self::GetTempoAccounts => "get_tempo_accounts",
            Self::CalculateCapacitySummary => "calculate_capacity_summary",
            Self::FindAvailableResources => "find_available_resources",
            Self::DetectOverAllocation => "detect_over_allocation",
            Self::AnalyzeVariance => "analyze_variance",
            Self::IdentifyUtilizationTrends => "identify_utilization_trends",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GetTeams => "Get all teams in the organization with their basic information.",
            Self::GetTeamMembers => {
                "Get all members of a specific team, including their account ids and roles."
            }
            Self::GetUserWorklogs => {
                "Get worklogs for a specific user within a date range. Returns time entries with hours logged."
            }
            Self::GetWorklogs => {
                "Get worklogs within a date range, optionally filtered by issue keys or project keys."
            }
            Self::GetProjects => "Get all projects with their keys and names.",
            Self::GetProjectEpics => {
                "Get epics for a project. Set initiativeOnly to return initiative-type issues only."
            }
            Self::SearchIssues => {
                "Search issues with a JQL query. Returns key, summary, status, assignee, priority and type."
            }
            Self::GetTimesheets => {
                "Get timesheet approvals within a date range, optionally for a single user."
            }
            Self::GetTempoAccounts => "Get all time-tracking accounts used for billing and budgets.",
            Self::CalculateCapacitySummary => {
                "Calculate capacity, logged hours, available hours and utilization for a team, user or project over a date range."
            }
            Self::FindAvailableResources => {
                "Find people with at least the requested number of available hours in a date range, optionally within one team."
            }
            Self::DetectOverAllocation => {
                "Detect people whose utilization exceeds a threshold percentage. Defaults to the current work week and 100%."
            }
            Self::AnalyzeVariance => {
                "Compare logged hours against expected hours for a project or user, with a day-by-day breakdown."
            }
            Self::IdentifyUtilizationTrends => {
                "Identify weekly utilization trends for a team or project over recent weeks."
            }
        }
    }

    pub fn schema(&self) -> InputSchema {
        match self {
            Self::GetTeams | Self::GetProjects | Self::GetTempoAccounts => NO_INPUT,
            Self::GetTeamMembers => TEAM_MEMBERS_SCHEMA,
            Self::GetUserWorklogs => USER_WORKLOGS_SCHEMA,
            Self::GetWorklogs => WORKLOGS_SCHEMA,
            Self::GetProjectEpics => PROJECT_EPICS_SCHEMA,
            Self::SearchIssues => SEARCH_ISSUES_SCHEMA,
            Self::GetTimesheets => TIMESHEETS_SCHEMA,
            Self::CalculateCapacitySummary => CAPACITY_SUMMARY_SCHEMA,
            Self::FindAvailableResources => AVAILABLE_RESOURCES_SCHEMA,
            Self::DetectOverAllocation => OVER_ALLOCATION_SCHEMA,
            Self::AnalyzeVariance => VARIANCE_SCHEMA,
            Self::IdentifyUtilizationTrends => TRENDS_SCHEMA,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.schema().to_json_schema(),
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == value)
            .ok_or_else(|| ToolError::UnknownTool(value.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMembersInput {
    pub team_id: u64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWorklogsInput {
    pub user_account_id: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogsInput {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default)]
    pub issue_keys: Option<Vec<String>>,
    #[serde(default)]
    pub project_keys: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEpicsInput {
    pub project_key: String,
    #[serde(default)]
    pub initiative_only: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIssuesInput {
    pub jql: String,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetsInput {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default)]
    pub user_account_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySummaryInput {
    pub scope: CapacityScope,
    pub scope_id: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableResourcesInput {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default)]
    pub minimum_hours_available: Option<f64>,
    #[serde(default)]
    pub team_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverAllocationInput {
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceInput {
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub project_key: Option<String>,
    #[serde(default)]
    pub user_account_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationTrendsInput {
    pub scope: TrendScope,
    pub scope_id: String,
    #[serde(default)]
    pub periods: Option<u32>,
}

/// A schema-checked, fully typed tool invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolRequest {
    Teams,
    TeamMembers(TeamMembersInput),
    UserWorklogs(UserWorklogsInput),
    Worklogs(WorklogsInput),
    Projects,
    ProjectEpics(ProjectEpicsInput),
    SearchIssues(SearchIssuesInput),
    Timesheets(TimesheetsInput),
    TempoAccounts,
    CapacitySummary(CapacitySummaryInput),
    AvailableResources(AvailableResourcesInput),
    OverAllocation(OverAllocationInput),
    Variance(VarianceInput),
    UtilizationTrends(UtilizationTrendsInput),
}

impl ToolRequest {
    pub fn parse(tool: ToolName, input: &Value) -> Result<Self, ToolError> {
        tool.schema().validate(input).map_err(|message| ToolError::invalid(tool, message))?;

        Ok(match tool {
            ToolName::GetTeams => Self::Teams,
            ToolName::GetTeamMembers => Self::TeamMembers(decode(tool, input)?),
            ToolName::GetUserWorklogs => Self::UserWorklogs(decode(tool, input)?),
            ToolName::GetWorklogs => Self::Worklogs(decode(tool, input)?),
            ToolName::GetProjects => Self::Projects,
            ToolName::GetProjectEpics => Self::ProjectEpics(decode(tool, input)?),
            ToolName::SearchIssues => Self::SearchIssues(decode(tool, input)?),
            ToolName::GetTimesheets => Self::Timesheets(decode(tool, input)?),
            ToolName::GetTempoAccounts => Self::TempoAccounts,
            ToolName::CalculateCapacitySummary => Self::CapacitySummary(decode(tool, input)?),
            ToolName::FindAvailableResources => Self::AvailableResources(decode(tool, input)?),
            ToolName::DetectOverAllocation => Self::OverAllocation(decode(tool, input)?),
            ToolName::AnalyzeVariance => Self::Variance(decode(tool, input)?),
            ToolName::IdentifyUtilizationTrends => Self::UtilizationTrends(decode(tool, input)?),
        })
    }
}

fn decode<T: DeserializeOwned>(tool: ToolName, input: &Value) -> Result<T, ToolError> {
    T::deserialize(input).map_err(|error| ToolError::invalid(tool, error.to_string()))
}

/// Collaborators and settings shared by every handler.
#[derive(Clone)]
pub struct ToolContext {
    pub teams: Arc<dyn TeamDirectory>,
    pub worklogs: Arc<dyn WorklogSource>,
    pub projects: Arc<dyn ProjectDirectory>,
    pub clock: Arc<dyn Clock>,
    pub hours_per_day: f64,
}

impl ToolContext {
    /// One in-memory workspace serving as all three collaborators.
    pub fn from_workspace(
        workspace: InMemoryWorkspace,
        clock: Arc<dyn Clock>,
        hours_per_day: f64,
    ) -> Self {
        let workspace = Arc::new(workspace);
        Self {
            teams: workspace.clone(),
            worklogs: workspace.clone(),
            projects: workspace,
            clock,
            hours_per_day,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

/// A registry entry backed by the typed handlers in this module.
pub struct CapacityTool {
    kind: ToolName,
    context: Arc<ToolContext>,
}

impl CapacityTool {
    pub fn new(kind: ToolName, context: Arc<ToolContext>) -> Self {
        Self { kind, context }
    }
}

#[async_trait]
impl Tool for CapacityTool {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    fn definition(&self) -> ToolDefinition {
        self.kind.definition()
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let request = ToolRequest::parse(self.kind, &input)?;
        dispatch(&self.context, request).await
    }
}

async fn dispatch(context: &ToolContext, request: ToolRequest) -> Result<Value, ToolError> {
    match request {
        ToolRequest::Teams => directory::teams(context).await,
        ToolRequest::TeamMembers(input) => directory::team_members(context, input).await,
        ToolRequest::Projects => directory::projects(context).await,
        ToolRequest::ProjectEpics(input) => directory::project_epics(context, input).await,
        ToolRequest::SearchIssues(input) => directory::search_issues(context, input).await,
        ToolRequest::TempoAccounts => directory::tempo_accounts(context).await,
        ToolRequest::UserWorklogs(input) => worklogs::user_worklogs(context, input).await,
        ToolRequest::Worklogs(input) => worklogs::worklogs(context, input).await,
        ToolRequest::Timesheets(input) => worklogs::timesheets(context, input).await,
        ToolRequest::CapacitySummary(input) => analytics::capacity_summary(context, input).await,
        ToolRequest::AvailableResources(input) => {
            analytics::available_resources(context, input).await
        }
        ToolRequest::OverAllocation(input) => analytics::over_allocation(context, input).await,
        ToolRequest::Variance(input) => analytics::variance(context, input).await,
        ToolRequest::UtilizationTrends(input) => {
            analytics::utilization_trends(context, input).await
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Runs one tool call. Unknown names and handler failures come back as
    /// failed outcomes.
    pub async fn execute(&self, name: &str, input: Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            let error = ToolError::UnknownTool(name.to_string());
            warn!(event_name = "agent.tool.unknown", tool = %name, "model requested an unknown tool");
            return ToolOutcome::failure(error.to_string());
        };

        match tool.execute(input).await {
            Ok(data) => {
                debug!(event_name = "agent.tool.succeeded", tool = %name, "tool call succeeded");
                ToolOutcome::success(data)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    tool = %name,
                    error = %error,
                    "tool call failed"
                );
                ToolOutcome::failure(error.to_string())
            }
        }
    }
}

/// Registry holding all fourteen capacity-planning tools.
pub fn standard_registry(context: Arc<ToolContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    for kind in ToolName::ALL {
        registry.register(CapacityTool::new(kind, context.clone()));
    }
    registry
}


#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use capplan_core::InMemoryWorkspace;
    use serde_json::json;

    use super::test_support::{registry, today};
    use super::{ToolName, ToolOutcome, ToolRequest};

    #[test]
    fn tool_names_round_trip_through_their_wire_names() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::from_str(tool.as_str()).ok(), Some(tool));
        }
        assert!(ToolName::from_str("drop_tables").is_err());
    }

    #[test]
    fn registry_advertises_every_tool() {
        let registry = registry(InMemoryWorkspace::new());
        assert_eq!(registry.len(), 14);

        let definitions = registry.definitions();
        let summary = definitions
            .iter()
            .find(|definition| definition.name == "calculate_capacity_summary")
            .expect("capacity summary tool");
        assert_eq!(
            summary.input_schema["required"],
            json!(["scope", "scopeId", "dateFrom", "dateTo"])
        );
    }

    #[test]
    fn typed_requests_apply_schema_before_decoding() {
        let parsed = ToolRequest::parse(
            ToolName::SearchIssues,
            &json!({"jql": "project = OPS", "maxResults": 5}),
        )
        .expect("valid search");
        assert!(matches!(parsed, ToolRequest::SearchIssues(ref input) if input.max_results == Some(5)));

        let rejected = ToolRequest::parse(ToolName::GetTeamMembers, &json!({"teamId": "one"}))
            .expect_err("string team id");
        assert_eq!(
            rejected.to_string(),
            "invalid input for `get_team_members`: `teamId` must be an integer"
        );
    }

    #[tokio::test]
    async fn unknown_tools_become_failed_outcomes() {
        let registry = registry(InMemoryWorkspace::new());
        let outcome = registry.execute("delete_everything", json!({})).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("unknown tool `delete_everything`"));
    }

    #[tokio::test]
    async fn collaborator_failures_become_failed_outcomes() {
        let workspace = InMemoryWorkspace::demo(today()).team_directory_offline();
        let registry = registry(workspace);
        let outcome = registry.execute("get_teams", json!({})).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().is_some_and(|error| error.contains("connection refused")));
    }

    #[test]
    fn model_content_carries_data_or_error() {
        let ok = ToolOutcome::success(json!({"count": 2}));
        assert_eq!(ok.model_content(), r#"{"count":2}"#);
        assert_eq!(ok.payload(), json!({"count": 2}));

        let failed = ToolOutcome::failure("team `9` was not found");
        assert_eq!(failed.model_content(), r#"{"error":"team `9` was not found"}"#);
        assert_eq!(failed.payload(), json!("team `9` was not found"));
    }
}
