use capplan_core::chrono::NaiveDate;

use crate::service::QueryContext;

/// System prompt for the capacity-planning assistant.
pub fn system_prompt(today: NaiveDate, context: Option<QueryContext>, hours_per_day: f64) -> String {
    let mut prompt = format!(
        "You are an AI assistant specialized in capacity planning and resource analytics for an \
enterprise team management system. You help people understand their teams' capacity, workload \
and resource allocation.

## Capabilities
- Look up teams, their members and projects
- Read worklogs, timesheets and accounts from the time-tracking system
- Search issues in the issue tracker
- Calculate capacity summaries and utilization
- Find people with available capacity for new work
- Detect over-allocation and under-utilization
- Compare planned against actual hours
- Identify utilization trends across recent weeks

## Response Guidelines
1. Be concise and actionable
2. Present data clearly, with bullet points or tables where they help
3. Call out key insights and risks
4. Ask a clarifying question when the request is ambiguous
5. Show dates in a readable form (for example \"Mar 5, 2025\")
6. Report hours to one decimal place and percentages as whole numbers

## Data Context
- Capacity is {hours} hours per working day, Monday to Friday
- Utilization above 100% means a person is over-allocated
- Utilization below 70% may mean a person or team is under-utilized

## Important Notes
- Always fetch real data with the tools instead of assuming
- Gather everything a question needs before answering
- Briefly show how you derived computed numbers
- If data is unavailable or a tool fails, say so plainly
",
        hours = format_hours(hours_per_day),
    );

    if let Some(context) = context {
        prompt.push_str(&format!(
            "\nThe user is asking from the {} view; prefer answers relevant to it.\n",
            context.as_str()
        ));
    }

    prompt.push_str(&format!("\nToday's date is {}.", today.format("%A, %B %-d, %Y")));
    prompt
}

fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{hours:.0}")
    } else {
        format!("{hours:.1}")
    }
}

#[cfg(test)]
mod tests {
    use capplan_core::chrono::NaiveDate;

    use super::system_prompt;
    use crate::service::QueryContext;

    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 5).expect("valid date")
    }

    #[test]
    fn prompt_states_conventions_and_date() {
        let prompt = system_prompt(wednesday(), None, 8.0);

        assert!(prompt.contains("Capacity is 8 hours per working day"));
        assert!(prompt.contains("above 100%"));
        assert!(prompt.contains("below 70%"));
        assert!(prompt.ends_with("Today's date is Wednesday, March 5, 2025."));
        assert!(!prompt.contains("view;"));
    }

    #[test]
    fn prompt_mentions_query_context() {
        let prompt = system_prompt(wednesday(), Some(QueryContext::Resources), 7.5);

        assert!(prompt.contains("Capacity is 7.5 hours"));
        assert!(prompt.contains("from the resources view"));
    }
}
