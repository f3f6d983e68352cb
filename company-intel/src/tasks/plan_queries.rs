use async_trait::async_trait;
use chrono::Utc;
use report_flow::{Context, FlowError, NextAction, Result, Task, TaskResult, extract_json_as};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::context_keys;
use crate::clients::CompletionClient;
use crate::models::{ReportInput, SearchQuery};

/// Turns the report input into a fixed set of categorized search queries.
/// An empty plan is a hard stop for the run.
pub struct PlanQueriesTask {
    completion: Arc<dyn CompletionClient>,
}

impl PlanQueriesTask {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Task for PlanQueriesTask {
    fn id(&self) -> &str {
        "plan_queries"
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let input: ReportInput = context
            .get(context_keys::INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("input not found in context".to_string()))?;

        let prompt = build_planner_prompt(&input);
        let response = self
            .completion
            .complete(&prompt, 1200)
            .await
            .map_err(|e| FlowError::StageFailed(format!("query planning failed: {}", e)))?;

        context.trace().record_exchange(self.id(), &prompt, &response);

        let queries = parse_queries(&response);
        if queries.is_empty() {
            return Err(FlowError::StageFailed(
                "query planner produced no search queries".to_string(),
            ));
        }

        info!(count = queries.len(), "planned search queries");
        let status = format!("planned {} search queries", queries.len());
        context.set(context_keys::QUERIES, &queries).await;

        Ok(TaskResult::new(Some(status), NextAction::Continue))
    }
}

fn build_planner_prompt(input: &ReportInput) -> String {
    let competitor_a = input.competitors.first().map(String::as_str).unwrap_or("");
    let competitor_b = input.competitors.get(1).map(String::as_str).unwrap_or("");
    let industry = input.industry.as_deref().unwrap_or("its industry");

    format!(
        r#"You are planning web searches for a competitive-intelligence report on {company} ({domain}), active in {industry}.
Known competitors: {competitors}.
Time window of interest: {window}.

Produce exactly one search query for each of these six categories:
1. company_news – direct news about {company}
2. competitor – news about the competitor "{competitor_a}"
3. competitor – news about the competitor "{competitor_b}"
4. market_trend – trends in {industry}
5. technology – technology shifts relevant to {company}
6. regulation – regulatory developments affecting {industry}

For each query include a one-line justification formatted as "Category: <category> – <reasoning>".

Return a JSON object exactly like:
{{"queries": [{{"query": "...", "reasoning": "Category: company_news – ..."}}]}}
Return only the JSON object."#,
        company = input.company_name,
        domain = input.company_domain,
        industry = industry,
        competitors = if input.competitors.is_empty() {
            "none known".to_string()
        } else {
            input.competitors.join(", ")
        },
        window = describe_time_window(input),
        competitor_a = if competitor_a.is_empty() {
            "the closest competitor"
        } else {
            competitor_a
        },
        competitor_b = if competitor_b.is_empty() {
            "another notable competitor"
        } else {
            competitor_b
        },
    )
}

/// "last N days", or an explicit hours/days-since phrase when a previous
/// report timestamp is available
fn describe_time_window(input: &ReportInput) -> String {
    match input.last_report_at {
        Some(last) => {
            let elapsed = Utc::now().signed_duration_since(last);
            let hours = elapsed.num_hours().max(1);
            if hours < 48 {
                format!("the {} hours since the previous report", hours)
            } else {
                format!("the {} days since the previous report", elapsed.num_days())
            }
        }
        None => format!("the last {} days", input.date_range_days),
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlannedQueries {
    #[serde(default)]
    queries: Vec<SearchQuery>,
}

/// Parsing failure yields an empty list; the caller treats that as fatal.
fn parse_queries(response: &str) -> Vec<SearchQuery> {
    match extract_json_as::<PlannedQueries>(response) {
        Ok(planned) => planned
            .queries
            .into_iter()
            .filter(|q| !q.query.trim().is_empty())
            .collect(),
        Err(e) => {
            warn!("could not parse planner response: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportType;

    fn input() -> ReportInput {
        ReportInput {
            company_name: "Acme".to_string(),
            company_domain: "acme.com".to_string(),
            industry: Some("robotics".to_string()),
            competitors: vec!["Initech".to_string(), "Globex".to_string()],
            report_type: ReportType::Weekly,
            date_range_days: 7,
            last_report_at: None,
            owner_id: None,
            min_articles: 0,
            use_deep_research: true,
        }
    }

    #[test]
    fn parses_queries_from_fenced_response() {
        let response = r#"Sure, here is the plan:
```json
{"queries": [
  {"query": "Acme robotics news", "reasoning": "Category: company_news – direct coverage"},
  {"query": "Initech funding", "reasoning": "Category: competitor – rival moves"}
]}
```"#;
        let queries = parse_queries(response);
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].query, "Acme robotics news");
    }

    #[test]
    fn unparseable_response_yields_empty_plan() {
        assert!(parse_queries("I could not think of any queries.").is_empty());
        assert!(parse_queries(r#"{"not_queries": []}"#).is_empty());
    }

    #[test]
    fn blank_queries_are_dropped() {
        let queries = parse_queries(r#"{"queries": [{"query": "  ", "reasoning": "x"}]}"#);
        assert!(queries.is_empty());
    }

    #[test]
    fn window_phrase_uses_day_count_without_cutoff() {
        assert_eq!(describe_time_window(&input()), "the last 7 days");
    }

    #[test]
    fn window_phrase_uses_hours_since_recent_cutoff() {
        let mut input = input();
        input.last_report_at = Some(Utc::now() - chrono::Duration::hours(20));
        let phrase = describe_time_window(&input);
        assert!(phrase.contains("hours since"), "got: {}", phrase);
    }

    #[test]
    fn prompt_names_both_competitor_slots() {
        let prompt = build_planner_prompt(&input());
        assert!(prompt.contains("\"Initech\""));
        assert!(prompt.contains("\"Globex\""));
        assert!(prompt.contains("regulation"));
    }
}
