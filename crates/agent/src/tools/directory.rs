//! Passthrough lookups against the team and project directories.

use serde_json::Value;

use super::{ProjectEpicsInput, SearchIssuesInput, TeamMembersInput, ToolContext, ToolError};

pub const DEFAULT_SEARCH_RESULTS: u32 = 50;

pub async fn teams(context: &ToolContext) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(context.teams.teams().await?)?)
}

pub async fn team_members(
    context: &ToolContext,
    input: TeamMembersInput,
) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(context.teams.team_members(input.team_id).await?)?)
}

pub async fn projects(context: &ToolContext) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(context.projects.projects().await?)?)
}

pub async fn project_epics(
    context: &ToolContext,
    input: ProjectEpicsInput,
) -> Result<Value, ToolError> {
    let epics = context
        .projects
        .epics(&input.project_key, input.initiative_only.unwrap_or(false))
        .await?;
    Ok(serde_json::to_value(epics)?)
}

pub async fn search_issues(
    context: &ToolContext,
    input: SearchIssuesInput,
) -> Result<Value, ToolError> {
    let max_results = input.max_results.unwrap_or(DEFAULT_SEARCH_RESULTS);
    Ok(serde_json::to_value(context.projects.search_issues(&input.jql, max_results).await?)?)
}

pub async fn tempo_accounts(context: &ToolContext) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(context.worklogs.accounts().await?)?)
}

#[cfg(test)]
mod tests {
    use capplan_core::InMemoryWorkspace;
    use serde_json::json;

    use crate::tools::test_support::{registry, today};

    #[tokio::test]
    async fn team_members_pass_through_the_directory() {
        let registry = registry(InMemoryWorkspace::demo(today()));
        let outcome = registry.execute("get_team_members", json!({"teamId": 2})).await;

        assert!(outcome.success);
        let members = outcome.data.expect("members");
        assert_eq!(members.as_array().map(Vec::len), Some(2));
        assert_eq!(members[0]["accountId"], "acc-cara");
    }

    #[tokio::test]
    async fn unknown_team_is_a_failed_outcome() {
        let registry = registry(InMemoryWorkspace::demo(today()));
        let outcome = registry.execute("get_team_members", json!({"teamId": 99})).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().is_some_and(|error| error.contains("99")));
    }

    #[tokio::test]
    async fn epics_can_be_limited_to_initiatives() {
        let registry = registry(InMemoryWorkspace::demo(today()));
        let outcome = registry
            .execute("get_project_epics", json!({"projectKey": "OPS", "initiativeOnly": true}))
            .await;

        let epics = outcome.data.expect("epics");
        assert_eq!(epics.as_array().map(Vec::len), Some(1));
        assert_eq!(epics[0]["key"], "OPS-3");
    }

    #[tokio::test]
    async fn issue_search_returns_simplified_records() {
        let registry = registry(InMemoryWorkspace::demo(today()));
        let outcome = registry
            .execute("search_issues", json!({"jql": "project = DATA", "maxResults": 10}))
            .await;

        let page = outcome.data.expect("search page");
        assert_eq!(page["total"], 2);
        assert_eq!(page["issues"][0]["key"], "DATA-1");
        assert_eq!(page["issues"][0]["status"], "In Progress");
    }

    #[tokio::test]
    async fn offline_project_directory_fails_project_lookups_only() {
        let registry = registry(InMemoryWorkspace::demo(today()).project_directory_offline());

        assert!(!registry.execute("get_projects", json!({})).await.success);
        assert!(registry.execute("get_tempo_accounts", json!({})).await.success);
    }
}
