//! Time-window queries against the worklog source.

use capplan_core::analytics::{logged_hours, round_hours};
use capplan_core::domain::worklog::{DateRange, Worklog, WorklogQuery};
use serde::Serialize;
use serde_json::Value;

use super::{TimesheetsInput, ToolContext, ToolError, UserWorklogsInput, WorklogsInput};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorklogListing {
    count: usize,
    total_hours: f64,
    results: Vec<Worklog>,
}

impl WorklogListing {
    fn new(results: Vec<Worklog>) -> Self {
        Self { count: results.len(), total_hours: round_hours(logged_hours(&results)), results }
    }
}

pub async fn user_worklogs(
    context: &ToolContext,
    input: UserWorklogsInput,
) -> Result<Value, ToolError> {
    let range = DateRange::new(input.date_from, input.date_to);
    let results = context.worklogs.user_worklogs(&input.user_account_id, range).await?;
    Ok(serde_json::to_value(WorklogListing::new(results))?)
}

pub async fn worklogs(context: &ToolContext, input: WorklogsInput) -> Result<Value, ToolError> {
    let query = WorklogQuery {
        range: Some(DateRange::new(input.date_from, input.date_to)),
        issue_keys: input.issue_keys.unwrap_or_default(),
        project_keys: input.project_keys.unwrap_or_default(),
    };
    let results = context.worklogs.worklogs(&query).await?;
    Ok(serde_json::to_value(WorklogListing::new(results))?)
}

pub async fn timesheets(
    context: &ToolContext,
    input: TimesheetsInput,
) -> Result<Value, ToolError> {
    let range = DateRange::new(input.date_from, input.date_to);
    let sheets =
        context.worklogs.timesheets(range, input.user_account_id.as_deref()).await?;
    Ok(serde_json::to_value(sheets)?)
}
