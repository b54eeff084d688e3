//! Computed analytics tools: gather raw data from the collaborators, then hand
//! it to the pure engine in `capplan_core::analytics`.
//!
//! Per-member fetches run concurrently. A member whose lookup fails is logged
//! and left out of the aggregate; failures of the roster lookups themselves
//! fail the tool call.

use capplan_core::analytics::{
    analyze_variance, detect_over_allocation, find_available_resources, logged_hours,
    recent_work_weeks, summarize_capacity, summarize_trend, trailing_window, work_week_of,
    CapacityScope, MemberLoad, TrendScope, WeekSample, DEFAULT_MINIMUM_HOURS_AVAILABLE,
    DEFAULT_OVER_ALLOCATION_THRESHOLD, DEFAULT_TREND_PERIODS, DEFAULT_VARIANCE_WINDOW_DAYS,
};
use capplan_core::domain::directory::{Team, TeamMember};
use capplan_core::domain::worklog::{DateRange, Worklog, WorklogQuery};
use futures_util::future::join_all;
use serde_json::Value;
use tracing::warn;

use super::{
    AvailableResourcesInput, CapacitySummaryInput, OverAllocationInput, ToolContext, ToolError,
    ToolName, UtilizationTrendsInput, VarianceInput,
};

pub const MAX_TREND_PERIODS: u32 = 52;

pub async fn capacity_summary(
    context: &ToolContext,
    input: CapacitySummaryInput,
) -> Result<Value, ToolError> {
    let range = DateRange::new(input.date_from, input.date_to);

    let (team_size, logged) = match input.scope {
        CapacityScope::Team => {
            let team_id = parse_team_id(ToolName::CalculateCapacitySummary, &input.scope_id)?;
            let members = context.teams.team_members(team_id).await?;
            let worklogs = member_worklogs(context, &members, range).await;
            let logged: f64 = worklogs.iter().map(|(_, worklogs)| logged_hours(worklogs)).sum();
            (members.len(), logged)
        }
        CapacityScope::User => {
            let worklogs = context.worklogs.user_worklogs(&input.scope_id, range).await?;
            (1, logged_hours(&worklogs))
        }
        CapacityScope::Project => {
            let query = WorklogQuery::for_project(range, input.scope_id.as_str());
            (0, logged_hours(&context.worklogs.worklogs(&query).await?))
        }
    };

    let summary = summarize_capacity(
        input.scope,
        &input.scope_id,
        range,
        team_size,
        logged,
        context.hours_per_day,
    );
    Ok(serde_json::to_value(summary)?)
}

pub async fn available_resources(
    context: &ToolContext,
    input: AvailableResourcesInput,
) -> Result<Value, ToolError> {
    let range = DateRange::new(input.date_from, input.date_to);
    let teams = match input.team_id {
        Some(team_id) => vec![context.teams.team(team_id).await?],
        None => context.teams.teams().await?,
    };

    let loads = member_loads(context, &teams, range).await;
    let report = find_available_resources(
        range,
        input.minimum_hours_available.unwrap_or(DEFAULT_MINIMUM_HOURS_AVAILABLE),
        context.hours_per_day,
        &loads,
    );
    Ok(serde_json::to_value(report)?)
}

pub async fn over_allocation(
    context: &ToolContext,
    input: OverAllocationInput,
) -> Result<Value, ToolError> {
    let week = work_week_of(context.today());
    let range =
        DateRange::new(input.date_from.unwrap_or(week.from), input.date_to.unwrap_or(week.to));

    let teams = context.teams.teams().await?;
    let loads = member_loads(context, &teams, range).await;
    let report = detect_over_allocation(
        range,
        input.threshold.unwrap_or(DEFAULT_OVER_ALLOCATION_THRESHOLD),
        context.hours_per_day,
        &loads,
    );
    Ok(serde_json::to_value(report)?)
}

pub async fn variance(context: &ToolContext, input: VarianceInput) -> Result<Value, ToolError> {
    let window = trailing_window(context.today(), DEFAULT_VARIANCE_WINDOW_DAYS);
    let range =
        DateRange::new(input.date_from.unwrap_or(window.from), input.date_to.unwrap_or(window.to));

    let worklogs: Vec<Worklog> = match (&input.user_account_id, &input.project_key) {
        (Some(account_id), project_key) => context
            .worklogs
            .user_worklogs(account_id, range)
            .await?
            .into_iter()
            .filter(|worklog| project_key.as_ref().map_or(true, |key| &worklog.project_key == key))
            .collect(),
        (None, Some(project_key)) => {
            let query = WorklogQuery::for_project(range, project_key.as_str());
            context.worklogs.worklogs(&query).await?
        }
        (None, None) => context.worklogs.worklogs(&WorklogQuery::within(range)).await?,
    };

    let report = analyze_variance(
        range,
        input.project_key.as_deref(),
        input.user_account_id.as_deref(),
        &worklogs,
        context.hours_per_day,
    );
    Ok(serde_json::to_value(report)?)
}

pub async fn utilization_trends(
    context: &ToolContext,
    input: UtilizationTrendsInput,
) -> Result<Value, ToolError> {
    let periods = input.periods.unwrap_or(DEFAULT_TREND_PERIODS);
    if periods == 0 || periods > MAX_TREND_PERIODS {
        return Err(ToolError::invalid(
            ToolName::IdentifyUtilizationTrends,
            format!("`periods` must be between 1 and {MAX_TREND_PERIODS}"),
        ));
    }

    let weeks = recent_work_weeks(context.today(), periods);
    let (Some(first), Some(last)) = (weeks.first(), weeks.last()) else {
        return Ok(serde_json::to_value(summarize_trend(input.scope, &input.scope_id, &[]))?);
    };
    let span = DateRange::new(first.from, last.to);

    let (member_count, worklogs) = match input.scope {
        TrendScope::Team => {
            let team_id = parse_team_id(ToolName::IdentifyUtilizationTrends, &input.scope_id)?;
            let members = context.teams.team_members(team_id).await?;
            let worklogs: Vec<Worklog> = member_worklogs(context, &members, span)
                .await
                .into_iter()
                .flat_map(|(_, worklogs)| worklogs)
                .collect();
            (members.len(), worklogs)
        }
        TrendScope::Project => {
            let query = WorklogQuery::for_project(span, input.scope_id.as_str());
            (0, context.worklogs.worklogs(&query).await?)
        }
    };

    let samples: Vec<WeekSample> = weeks
        .iter()
        .map(|week| {
            let in_week: f64 = worklogs
                .iter()
                .filter(|worklog| week.contains(worklog.start_date))
                .map(Worklog::hours)
                .sum();
            WeekSample::new(week.from, in_week, member_count, context.hours_per_day)
        })
        .collect();

    Ok(serde_json::to_value(summarize_trend(input.scope, &input.scope_id, &samples))?)
}

/// Hours logged by every linked member of `teams` in `range`. Team rosters
/// and member worklogs are fetched concurrently; failures are skipped.
pub(crate) async fn member_loads(
    context: &ToolContext,
    teams: &[Team],
    range: DateRange,
) -> Vec<MemberLoad> {
    let rosters = join_all(teams.iter().map(|team| async move {
        (team, context.teams.team_members(team.id).await)
    }))
    .await;

    let mut roster = Vec::new();
    for (team, members) in rosters {
        match members {
            Ok(members) => {
                roster.extend(linked_members(members).into_iter().map(|member| (team, member)));
            }
            Err(error) => warn!(
                event_name = "analytics.team_members.skipped",
                team_id = team.id,
                error = %error,
                "skipping team whose members could not be fetched"
            ),
        }
    }

    let members: Vec<TeamMember> = roster.iter().map(|(_, member)| member.clone()).collect();
    let worklogs = member_worklogs(context, &members, range).await;

    roster
        .into_iter()
        .filter_map(|(team, member)| {
            let account_id = member.account_id?;
            let (_, logs) = worklogs.iter().find(|(id, _)| id == &account_id)?;
            Some(MemberLoad {
                account_id,
                display_name: member.display_name,
                team_id: team.id,
                team_name: team.name.clone(),
                logged_hours: logged_hours(logs),
            })
        })
        .collect()
}

/// Worklogs per account id for the members whose lookup succeeded. Members
/// without an account have nothing to fetch and are passed over.
async fn member_worklogs(
    context: &ToolContext,
    members: &[TeamMember],
    range: DateRange,
) -> Vec<(String, Vec<Worklog>)> {
    let fetches = members.iter().filter_map(|member| member.account_id.as_deref()).map(
        |account_id| async move {
            (account_id, context.worklogs.user_worklogs(account_id, range).await)
        },
    );

    join_all(fetches)
        .await
        .into_iter()
        .filter_map(|(account_id, result)| match result {
            Ok(worklogs) => Some((account_id.to_string(), worklogs)),
            Err(error) => {
                warn!(
                    event_name = "analytics.member_worklogs.skipped",
                    account_id = %account_id,
                    error = %error,
                    "skipping member whose worklogs could not be fetched"
                );
                None
            }
        })
        .collect()
}

fn linked_members(members: Vec<TeamMember>) -> Vec<TeamMember> {
    members.into_iter().filter(|member| member.account_id.is_some()).collect()
}

fn parse_team_id(tool: ToolName, scope_id: &str) -> Result<u64, ToolError> {
    scope_id.trim().parse().map_err(|_| {
        ToolError::invalid(tool, format!("team scope requires a numeric team id, got `{scope_id}`"))
    })
}
