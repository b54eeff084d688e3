//! Contracts for the time-tracking and issue-tracking systems the analytics
//! read from. Wire clients live outside this workspace; implementations map
//! their own failures into [`SourceError`].

use async_trait::async_trait;

use crate::domain::directory::{IssueSearchPage, IssueSummary, Project, Team, TeamMember, TempoAccount};
use crate::domain::worklog::{DateRange, Timesheet, Worklog, WorklogQuery};
use crate::errors::SourceError;

#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn teams(&self) -> Result<Vec<Team>, SourceError>;

    async fn team(&self, team_id: u64) -> Result<Team, SourceError>;

    async fn team_members(&self, team_id: u64) -> Result<Vec<TeamMember>, SourceError>;
}

#[async_trait]
pub trait WorklogSource: Send + Sync {
    async fn user_worklogs(
        &self,
        account_id: &str,
        range: DateRange,
    ) -> Result<Vec<Worklog>, SourceError>;

    async fn worklogs(&self, query: &WorklogQuery) -> Result<Vec<Worklog>, SourceError>;

    async fn timesheets(
        &self,
        range: DateRange,
        account_id: Option<&str>,
    ) -> Result<Vec<Timesheet>, SourceError>;

    async fn accounts(&self) -> Result<Vec<TempoAccount>, SourceError>;
}

#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn projects(&self) -> Result<Vec<Project>, SourceError>;

    /// Epics of a project; `initiative_only` narrows the result to
    /// initiative-type issues.
    async fn epics(
        &self,
        project_key: &str,
        initiative_only: bool,
    ) -> Result<Vec<IssueSummary>, SourceError>;

    async fn search_issues(
        &self,
        jql: &str,
        max_results: u32,
    ) -> Result<IssueSearchPage, SourceError>;
}
