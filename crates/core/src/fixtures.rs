//! Deterministic in-memory stand-in for the team directory, worklog source and
//! project directory. Tests build one with the `with_*` builders; binaries use
//! [`InMemoryWorkspace::demo`] until real wire clients are configured.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use crate::analytics::calendar::{is_business_day, work_week_of};
use crate::domain::directory::{
    AccountStatus, IssueSearchPage, IssueSummary, Project, Team, TeamMember, TempoAccount,
};
use crate::domain::worklog::{DateRange, Timesheet, TimesheetStatus, Worklog, WorklogQuery};
use crate::errors::SourceError;
use crate::sources::{ProjectDirectory, TeamDirectory, WorklogSource};

const TEAM_SOURCE: &str = "team directory";
const WORKLOG_SOURCE: &str = "worklog source";
const PROJECT_SOURCE: &str = "project directory";

#[derive(Clone, Debug, Default)]
pub struct InMemoryWorkspace {
    teams: Vec<Team>,
    members: Vec<TeamMember>,
    worklogs: Vec<Worklog>,
    timesheets: Vec<Timesheet>,
    accounts: Vec<TempoAccount>,
    projects: Vec<Project>,
    issues: Vec<IssueSummary>,
    failing_accounts: HashSet<String>,
    team_directory_offline: bool,
    project_directory_offline: bool,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_team(mut self, id: u64, name: &str) -> Self {
        self.teams.push(Team { id, name: name.to_string(), summary: None, lead_account_id: None });
        self
    }

    pub fn with_member(mut self, team_id: u64, account_id: &str, display_name: &str) -> Self {
        self.members.push(TeamMember {
            team_id,
            account_id: Some(account_id.to_string()),
            display_name: display_name.to_string(),
            commitment_percent: Some(100),
            role: Some("Member".to_string()),
        });
        self
    }

    /// Adds a membership the upstream directory reports without an account id.
    pub fn with_unlinked_member(mut self, team_id: u64, display_name: &str) -> Self {
        self.members.push(TeamMember {
            team_id,
            account_id: None,
            display_name: display_name.to_string(),
            commitment_percent: None,
            role: None,
        });
        self
    }

    pub fn with_worklog(
        mut self,
        account_id: &str,
        issue_key: &str,
        start_date: NaiveDate,
        hours: f64,
    ) -> Self {
        let project_key = issue_key.split('-').next().unwrap_or(issue_key).to_string();
        let id = self.worklogs.len() as u64 + 1;
        self.worklogs.push(Worklog {
            id,
            issue_key: issue_key.to_string(),
            project_key,
            author_account_id: account_id.to_string(),
            start_date,
            time_spent_seconds: (hours * 3600.0).round() as u64,
            description: String::new(),
        });
        self
    }

    /// Logs `hours_per_day` on every business day of `range`.
    pub fn with_daily_worklogs(
        mut self,
        account_id: &str,
        issue_key: &str,
        range: DateRange,
        hours_per_day: f64,
    ) -> Self {
        for date in range.from.iter_days().take_while(|date| *date <= range.to) {
            if is_business_day(date) {
                self = self.with_worklog(account_id, issue_key, date, hours_per_day);
            }
        }
        self
    }

    pub fn with_timesheet(mut self, timesheet: Timesheet) -> Self {
        self.timesheets.push(timesheet);
        self
    }

    pub fn with_account(mut self, account: TempoAccount) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn with_project(mut self, key: &str, name: &str) -> Self {
        let id = (10_000 + self.projects.len()).to_string();
        self.projects.push(Project {
            id,
            key: key.to_string(),
            name: name.to_string(),
            project_type_key: "software".to_string(),
        });
        self
    }

    pub fn with_issue(mut self, key: &str, summary: &str, issue_type: &str, status: &str) -> Self {
        self.issues.push(IssueSummary {
            key: key.to_string(),
            summary: summary.to_string(),
            status: Some(status.to_string()),
            assignee: None,
            priority: Some("Medium".to_string()),
            issue_type: Some(issue_type.to_string()),
        });
        self
    }

    /// Every worklog lookup for `account_id` fails as if the upstream call
    /// timed out.
    pub fn fail_worklogs_for(mut self, account_id: &str) -> Self {
        self.failing_accounts.insert(account_id.to_string());
        self
    }

    pub fn team_directory_offline(mut self) -> Self {
        self.team_directory_offline = true;
        self
    }

    pub fn project_directory_offline(mut self) -> Self {
        self.project_directory_offline = true;
        self
    }

    /// A small organisation with four weeks of history ending at `today`:
    /// one over-allocated platform team, one under-utilized data team and a
    /// mobile team that includes a membership without an account.
    pub fn demo(today: NaiveDate) -> Self {
        let current_week = work_week_of(today);
        let history = DateRange::new(current_week.from - Duration::weeks(3), current_week.to);

        Self::new()
            .with_team(1, "Platform")
            .with_team(2, "Data")
            .with_team(3, "Mobile")
            .with_member(1, "acc-ana", "Ana Ortiz")
            .with_member(1, "acc-ben", "Ben Okafor")
            .with_member(2, "acc-cara", "Cara Lindqvist")
            .with_member(2, "acc-dev", "Dev Raman")
            .with_member(3, "acc-eli", "Eli Novak")
            .with_unlinked_member(3, "Former Contractor")
            .with_project("OPS", "Operations Platform")
            .with_project("DATA", "Data Warehouse")
            .with_project("MOB", "Mobile App")
            .with_issue("OPS-1", "Kubernetes migration", "Epic", "In Progress")
            .with_issue("OPS-2", "Observability rollout", "Epic", "To Do")
            .with_issue("OPS-3", "Platform reliability 2025", "Initiative", "In Progress")
            .with_issue("DATA-1", "Warehouse consolidation", "Epic", "In Progress")
            .with_issue("DATA-7", "Nightly ingest fails on schema drift", "Bug", "To Do")
            .with_issue("MOB-1", "Offline mode", "Epic", "In Progress")
            .with_issue("MOB-4", "Crash on login with SSO", "Bug", "In Review")
            .with_daily_worklogs("acc-ana", "OPS-1", history, 8.0)
            .with_daily_worklogs("acc-ben", "OPS-2", history, 9.5)
            .with_daily_worklogs("acc-cara", "DATA-1", history, 5.0)
            .with_daily_worklogs("acc-dev", "DATA-7", history, 3.5)
            .with_daily_worklogs("acc-eli", "MOB-1", history, 7.0)
            .with_timesheet(Timesheet {
                account_id: "acc-ana".to_string(),
                period: current_week,
                status: TimesheetStatus::Open,
                required_seconds: 40 * 3600,
                time_spent_seconds: 0,
            })
            .with_timesheet(Timesheet {
                account_id: "acc-cara".to_string(),
                period: DateRange::new(
                    current_week.from - Duration::weeks(1),
                    current_week.to - Duration::weeks(1),
                ),
                status: TimesheetStatus::Approved,
                required_seconds: 40 * 3600,
                time_spent_seconds: 25 * 3600,
            })
            .with_account(TempoAccount {
                id: 1,
                key: "INTERNAL".to_string(),
                name: "Internal Engineering".to_string(),
                status: AccountStatus::Open,
                global: true,
                monthly_budget: None,
            })
            .with_account(TempoAccount {
                id: 2,
                key: "CLIENT-ACME".to_string(),
                name: "Acme Retainer".to_string(),
                status: AccountStatus::Open,
                global: false,
                monthly_budget: Some(320.0),
            })
    }

    fn check_worklog_access(&self, account_id: &str) -> Result<(), SourceError> {
        if self.failing_accounts.contains(account_id) {
            return Err(SourceError::Unavailable {
                source_name: WORKLOG_SOURCE,
                message: format!("timed out fetching worklogs for {account_id}"),
            });
        }
        Ok(())
    }

    fn check_online(offline: bool, source_name: &'static str) -> Result<(), SourceError> {
        if offline {
            return Err(SourceError::Unavailable {
                source_name,
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn project_issues<'a>(&'a self, project_key: &'a str) -> impl Iterator<Item = &'a IssueSummary> {
        let prefix = format!("{project_key}-");
        self.issues.iter().filter(move |issue| issue.key.starts_with(&prefix))
    }
}

#[async_trait]
impl TeamDirectory for InMemoryWorkspace {
    async fn teams(&self) -> Result<Vec<Team>, SourceError> {
        Self::check_online(self.team_directory_offline, TEAM_SOURCE)?;
        Ok(self.teams.clone())
    }

    async fn team(&self, team_id: u64) -> Result<Team, SourceError> {
        Self::check_online(self.team_directory_offline, TEAM_SOURCE)?;
        self.teams
            .iter()
            .find(|team| team.id == team_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound { entity: "team", id: team_id.to_string() })
    }

    async fn team_members(&self, team_id: u64) -> Result<Vec<TeamMember>, SourceError> {
        Self::check_online(self.team_directory_offline, TEAM_SOURCE)?;
        if !self.teams.iter().any(|team| team.id == team_id) {
            return Err(SourceError::NotFound { entity: "team", id: team_id.to_string() });
        }
        Ok(self.members.iter().filter(|member| member.team_id == team_id).cloned().collect())
    }
}

#[async_trait]
impl WorklogSource for InMemoryWorkspace {
    async fn user_worklogs(
        &self,
        account_id: &str,
        range: DateRange,
    ) -> Result<Vec<Worklog>, SourceError> {
        self.check_worklog_access(account_id)?;
        Ok(self
            .worklogs
            .iter()
            .filter(|worklog| {
                worklog.author_account_id == account_id && range.contains(worklog.start_date)
            })
            .cloned()
            .collect())
    }

    async fn worklogs(&self, query: &WorklogQuery) -> Result<Vec<Worklog>, SourceError> {
        Ok(self
            .worklogs
            .iter()
            .filter(|worklog| !self.failing_accounts.contains(&worklog.author_account_id))
            .filter(|worklog| query.matches(worklog))
            .cloned()
            .collect())
    }

    async fn timesheets(
        &self,
        range: DateRange,
        account_id: Option<&str>,
    ) -> Result<Vec<Timesheet>, SourceError> {
        if let Some(account_id) = account_id {
            self.check_worklog_access(account_id)?;
        }
        Ok(self
            .timesheets
            .iter()
            .filter(|sheet| sheet.period.from <= range.to && range.from <= sheet.period.to)
            .filter(|sheet| account_id.map(|id| sheet.account_id == id).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn accounts(&self) -> Result<Vec<TempoAccount>, SourceError> {
        Ok(self.accounts.clone())
    }
}

#[async_trait]
impl ProjectDirectory for InMemoryWorkspace {
    async fn projects(&self) -> Result<Vec<Project>, SourceError> {
        Self::check_online(self.project_directory_offline, PROJECT_SOURCE)?;
        Ok(self.projects.clone())
    }

    async fn epics(
        &self,
        project_key: &str,
        initiative_only: bool,
    ) -> Result<Vec<IssueSummary>, SourceError> {
        Self::check_online(self.project_directory_offline, PROJECT_SOURCE)?;
        if !self.projects.iter().any(|project| project.key == project_key) {
            return Err(SourceError::NotFound { entity: "project", id: project_key.to_string() });
        }
        Ok(self
            .project_issues(project_key)
            .filter(|issue| {
                if initiative_only {
                    issue.is_initiative()
                } else {
                    issue.issue_type.as_deref() == Some("Epic") || issue.is_initiative()
                }
            })
            .cloned()
            .collect())
    }

    /// Understands `project = KEY` clauses and `text ~ "phrase"` clauses; any
    /// other JQL matches every issue.
    async fn search_issues(
        &self,
        jql: &str,
        max_results: u32,
    ) -> Result<IssueSearchPage, SourceError> {
        Self::check_online(self.project_directory_offline, PROJECT_SOURCE)?;
        let filter = JqlFilter::parse(jql);
        let matched: Vec<&IssueSummary> =
            self.issues.iter().filter(|issue| filter.matches(issue)).collect();

        Ok(IssueSearchPage {
            total: matched.len() as u32,
            issues: matched.into_iter().take(max_results as usize).cloned().collect(),
        })
    }
}

#[derive(Debug, Default)]
struct JqlFilter {
    project: Option<String>,
    text: Option<String>,
}

impl JqlFilter {
    fn parse(jql: &str) -> Self {
        let mut filter = Self::default();
        for clause in jql.lines().flat_map(|line| line.split(" AND ")) {
            let clause = clause.trim();
            if let Some((field, value)) = clause.split_once('=') {
                if field.trim().eq_ignore_ascii_case("project") {
                    filter.project = Some(unquote(value));
                }
            } else if let Some((field, value)) = clause.split_once('~') {
                if field.trim().eq_ignore_ascii_case("text") {
                    filter.text = Some(unquote(value).to_lowercase());
                }
            }
        }
        filter
    }

    fn matches(&self, issue: &IssueSummary) -> bool {
        let project_ok = self
            .project
            .as_ref()
            .map(|project| issue.key.starts_with(&format!("{project}-")))
            .unwrap_or(true);
        let text_ok = self
            .text
            .as_ref()
            .map(|text| issue.summary.to_lowercase().contains(text))
            .unwrap_or(true);
        project_ok && text_ok
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::InMemoryWorkspace;
    use crate::domain::worklog::{DateRange, WorklogQuery};
    use crate::errors::SourceError;
    use crate::sources::{ProjectDirectory, TeamDirectory, WorklogSource};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 12).expect("valid date")
    }

    #[tokio::test]
    async fn demo_workspace_exposes_teams_and_members() {
        let workspace = InMemoryWorkspace::demo(today());

        let teams = workspace.teams().await.expect("teams");
        assert_eq!(teams.len(), 3);

        let mobile = workspace.team_members(3).await.expect("members");
        assert_eq!(mobile.len(), 2);
        assert!(mobile.iter().any(|member| member.account_id.is_none()));
    }

    #[tokio::test]
    async fn demo_worklogs_cover_business_days_only() {
        let workspace = InMemoryWorkspace::demo(today());
        let week = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 3, 8).expect("valid date"),
            NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date"),
        );

        let logs = workspace.user_worklogs("acc-ana", week).await.expect("worklogs");
        assert_eq!(logs.len(), 5);
        assert!(logs.iter().all(|log| log.project_key == "OPS"));
    }

    #[tokio::test]
    async fn failure_injection_targets_one_account() {
        let workspace = InMemoryWorkspace::demo(today()).fail_worklogs_for("acc-ben");
        let week = DateRange::new(today(), today());

        let failure = workspace.user_worklogs("acc-ben", week).await;
        assert!(matches!(failure, Err(SourceError::Unavailable { .. })));
        assert!(workspace.user_worklogs("acc-ana", week).await.is_ok());
    }

    #[tokio::test]
    async fn project_worklog_query_filters_by_key() {
        let workspace = InMemoryWorkspace::demo(today());
        let query = WorklogQuery::for_project(DateRange::new(today(), today()), "DATA");

        let logs = workspace.worklogs(&query).await.expect("worklogs");
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log.project_key == "DATA"));
    }

    #[tokio::test]
    async fn epics_can_be_narrowed_to_initiatives() {
        let workspace = InMemoryWorkspace::demo(today());

        let epics = workspace.epics("OPS", false).await.expect("epics");
        assert_eq!(epics.len(), 3);
        let initiatives = workspace.epics("OPS", true).await.expect("initiatives");
        assert_eq!(initiatives.len(), 1);
        assert!(workspace.epics("NOPE", false).await.is_err());
    }

    #[tokio::test]
    async fn search_understands_project_and_text_clauses() {
        let workspace = InMemoryWorkspace::demo(today());

        let page = workspace
            .search_issues("project = MOB AND text ~ \"crash\"", 50)
            .await
            .expect("search");
        assert_eq!(page.total, 1);
        assert_eq!(page.issues[0].key, "MOB-4");

        let truncated = workspace.search_issues("order by created", 2).await.expect("search");
        assert_eq!(truncated.total, 7);
        assert_eq!(truncated.issues.len(), 2);
    }

    #[tokio::test]
    async fn offline_team_directory_reports_unavailable() {
        let workspace = InMemoryWorkspace::demo(today()).team_directory_offline();
        assert!(matches!(workspace.teams().await, Err(SourceError::Unavailable { .. })));
    }
}
