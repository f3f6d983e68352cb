//! The agentic deep-research loop. Per candidate, the model is asked whether
//! the primary source plus everything gathered so far is enough to write a
//! grounded article; it may request 1-2 follow-up searches per round. The
//! model's judgment only ever steers stop/continue — its text is never
//! treated as a source of facts.

use futures::future::join_all;
use report_flow::{TraceRecorder, extract_json_as};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, warn};

use super::{excluded_domains, truncate_chars};
use crate::clients::{CompletionClient, SearchClient, SearchDepth, SearchOptions};
use crate::models::{Candidate, ReportInput, SearchResult};

/// Hard cap on evaluate/search rounds per candidate
pub const MAX_RESEARCH_ITERATIONS: usize = 3;

/// At or above this confidence the session ends even if the model asked to
/// keep searching; checked after the round's searches ran.
const CONFIDENCE_DONE: u8 = 90;

const MAX_FOLLOWUP_QUERIES: usize = 2;
const FOLLOWUP_RESULTS_PER_QUERY: usize = 5;
const SOURCE_SNIPPET_CHARS: usize = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchAction {
    Done,
    Search,
}

/// The structured decision required from the model on every round
#[derive(Debug, Deserialize)]
pub struct ResearchDecision {
    pub action: ResearchAction,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub queries: Vec<String>,
}

/// Run one candidate's research session and return the additional sources it
/// accumulated. The session is private to the candidate; sources are
/// deduplicated by url against the primary source and each other.
///
/// Fail-soft throughout: an unparseable decision or a failed completion call
/// ends the session with whatever was gathered so far.
pub async fn research_candidate(
    completion: &dyn CompletionClient,
    search: &dyn SearchClient,
    candidate: &Candidate,
    input: &ReportInput,
    trace: &TraceRecorder,
) -> Vec<SearchResult> {
    let mut additional: Vec<SearchResult> = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::from([candidate.source.url.clone()]);

    for iteration in 0..MAX_RESEARCH_ITERATIONS {
        let prompt = build_decision_prompt(candidate, &additional, input);
        let response = match completion.complete(&prompt, 800).await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %candidate.source.url, "research evaluation failed: {}", e);
                break;
            }
        };
        trace.record_exchange("deep_research", &prompt, &response);

        let decision = match extract_json_as::<ResearchDecision>(&response) {
            Ok(d) => d,
            Err(e) => {
                warn!(url = %candidate.source.url, "unparseable research decision: {}", e);
                break;
            }
        };

        if decision.action == ResearchAction::Search && !decision.queries.is_empty() {
            let queries: Vec<&String> =
                decision.queries.iter().take(MAX_FOLLOWUP_QUERIES).collect();
            let found = run_followups(search, &queries).await;
            let mut appended = 0usize;
            for result in found {
                if seen_urls.insert(result.url.clone()) {
                    additional.push(result);
                    appended += 1;
                }
            }
            trace.record(
                "deep_research",
                Some(json!({
                    "iteration": iteration + 1,
                    "queries": queries,
                    "new_sources": appended,
                    "reasoning": decision.reasoning,
                })),
            );
        }

        if decision.action == ResearchAction::Done {
            break;
        }
        if decision.confidence >= CONFIDENCE_DONE {
            info!(
                url = %candidate.source.url,
                confidence = decision.confidence,
                "confidence threshold reached"
            );
            break;
        }
    }

    additional
}

async fn run_followups(search: &dyn SearchClient, queries: &[&String]) -> Vec<SearchResult> {
    let options = SearchOptions {
        depth: SearchDepth::Advanced,
        max_results: FOLLOWUP_RESULTS_PER_QUERY,
        exclude_domains: excluded_domains(),
        days: None,
    };

    let batches = join_all(queries.iter().map(|query| {
        let options = options.clone();
        async move {
            match search.search(query, &options).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(query = %query, "follow-up search failed: {}", e);
                    Vec::new()
                }
            }
        }
    }))
    .await;

    batches.into_iter().flatten().collect()
}

fn build_decision_prompt(
    candidate: &Candidate,
    additional: &[SearchResult],
    input: &ReportInput,
) -> String {
    let mut gathered = String::new();
    for (i, source) in additional.iter().enumerate() {
        gathered.push_str(&format!(
            "{}. {} ({})\n   {}\n",
            i + 1,
            source.title,
            source.url,
            truncate_chars(&source.content, SOURCE_SNIPPET_CHARS)
        ));
    }
    if gathered.is_empty() {
        gathered = "none yet".to_string();
    }

    format!(
        r#"You are researching an article about {company} for an intelligence report.

Primary source:
{title} ({url})
{content}

Additional sources gathered so far:
{gathered}

Decide whether there is enough corroborating material to write a well-grounded 300-500 word article, or whether more searching is needed.

Return a JSON object exactly like:
{{"action": "done" | "search", "reasoning": "...", "confidence": 0-100, "queries": ["..."]}}
If action is "search", include 1-2 specific follow-up queries. Return only the JSON object."#,
        company = input.company_name,
        title = candidate.source.title,
        url = candidate.source.url,
        content = truncate_chars(&candidate.source.content, SOURCE_SNIPPET_CHARS),
        gathered = gathered,
    )
}
