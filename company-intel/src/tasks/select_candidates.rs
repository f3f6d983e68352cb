use async_trait::async_trait;
use report_flow::{Context, FlowError, NextAction, Result, Task, TaskResult, extract_json_as};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::{context_keys, truncate_chars};
use crate::clients::CompletionClient;
use crate::knowledge::CompanyKnowledge;
use crate::models::{ArticleCategory, Candidate, ReportInput, SearchResult};

/// Upper bound on the candidate shortlist
pub const TARGET_ARTICLES: usize = 5;

const SNIPPET_CHARS: usize = 400;

/// Ranks and filters raw search results into a bounded, thematically-diverse
/// shortlist. Selecting zero items is a valid outcome and ends the run with
/// a "no news" report; it is never an error.
pub struct SelectCandidatesTask {
    completion: Arc<dyn CompletionClient>,
}

impl SelectCandidatesTask {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Task for SelectCandidatesTask {
    fn id(&self) -> &str {
        "select_candidates"
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let input: ReportInput = context
            .get(context_keys::INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("input not found in context".to_string()))?;
        let results: Vec<SearchResult> = context
            .get(context_keys::SEARCH_RESULTS)
            .await
            .ok_or_else(|| {
                FlowError::ContextError("search results not found in context".to_string())
            })?;
        let knowledge: Option<CompanyKnowledge> = context.get(context_keys::KNOWLEDGE).await;

        let prompt = build_selection_prompt(&results, &input, knowledge.as_ref());
        let candidates = match self.completion.complete(&prompt, 1500).await {
            Ok(response) => {
                context.trace().record_exchange(self.id(), &prompt, &response);
                parse_selection(&response, &results, &input)
            }
            Err(e) => {
                // Not fatal: an unusable selection surfaces as a "no news" report
                warn!("candidate selection call failed: {}", e);
                Vec::new()
            }
        };

        context.set(context_keys::CANDIDATES, &candidates).await;

        if candidates.is_empty() {
            info!("no candidates selected, ending run with an empty report");
            return Ok(TaskResult::new(
                Some("no significant developments selected".to_string()),
                NextAction::End,
            ));
        }

        let status = format!("selected {} of {} results", candidates.len(), results.len());
        Ok(TaskResult::new(Some(status), NextAction::Continue))
    }
}

fn build_selection_prompt(
    results: &[SearchResult],
    input: &ReportInput,
    knowledge: Option<&CompanyKnowledge>,
) -> String {
    let mut listing = String::new();
    for (i, r) in results.iter().enumerate() {
        let date = r
            .published_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        listing.push_str(&format!(
            "{}. {} ({})\n   {}\n   {}\n",
            i + 1,
            r.title,
            date,
            r.url,
            truncate_chars(&r.content, SNIPPET_CHARS)
        ));
    }

    let context_block = knowledge
        .map(|k| format!("\n{}\n", k.prompt_context()))
        .unwrap_or_default();

    let cutoff_line = input
        .last_report_at
        .map(|t| {
            format!(
                "Only select items published after {} — earlier items were already reported.\n",
                t.format("%Y-%m-%d %H:%M UTC")
            )
        })
        .unwrap_or_default();

    format!(
        r#"You are curating a competitive-intelligence report on {company}.
{context_block}
Below are numbered search results. Select the most newsworthy, up to {target} items.
Quality over quantity: select at least {min} items, and if nothing is genuinely newsworthy select none at all — an empty selection is a perfectly good answer.
{cutoff_line}Each selected item must have a DIFFERENT category, one of: company_news, competitor, market_trend, technology, regulation, funding, product_launch, opinion. Never use a category twice.

Search results:
{listing}
Return a JSON object exactly like:
{{"selected": [{{"index": 1, "category": "company_news", "reason": "..."}}]}}
Use the item numbers above. Return only the JSON object."#,
        company = input.company_name,
        context_block = context_block,
        target = TARGET_ARTICLES,
        min = input.min_articles,
        cutoff_line = cutoff_line,
        listing = listing,
    )
}

#[derive(Debug, Deserialize)]
struct SelectionItem {
    index: usize,
    category: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct Selection {
    #[serde(default)]
    selected: Vec<SelectionItem>,
}

/// Defensive post-parse enforcement: indexes must exist and be unique,
/// categories must parse and be unique (first one wins, violations logged),
/// and items with a known publish date must fall after the report cutoff.
fn parse_selection(
    response: &str,
    results: &[SearchResult],
    input: &ReportInput,
) -> Vec<Candidate> {
    let selection = match extract_json_as::<Selection>(response) {
        Ok(s) => s,
        Err(e) => {
            warn!("could not parse selection response: {}", e);
            return Vec::new();
        }
    };

    let mut seen_indexes: HashSet<usize> = HashSet::new();
    let mut seen_categories: HashSet<ArticleCategory> = HashSet::new();
    let mut candidates = Vec::new();

    for item in selection.selected {
        // Items are numbered from 1 in the prompt
        let Some(result) = item.index.checked_sub(1).and_then(|i| results.get(i)) else {
            warn!(index = item.index, "selection referenced an unknown item");
            continue;
        };
        if !seen_indexes.insert(item.index) {
            warn!(index = item.index, "duplicate selection index ignored");
            continue;
        }
        let Some(category) = ArticleCategory::parse(&item.category) else {
            warn!(category = %item.category, "unknown category ignored");
            continue;
        };
        if !seen_categories.insert(category) {
            warn!(category = %item.category, "duplicate category ignored");
            continue;
        }
        if let (Some(cutoff), Some(published)) = (input.last_report_at, result.published_date)
            && published <= cutoff
        {
            warn!(url = %result.url, "item predates the previous report, ignored");
            continue;
        }
        candidates.push(Candidate {
            source: result.clone(),
            category,
            reason: item.reason,
        });
        if candidates.len() == TARGET_ARTICLES {
            break;
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportType;
    use chrono::{Duration, Utc};

    fn input() -> ReportInput {
        ReportInput {
            company_name: "Acme".to_string(),
            company_domain: "acme.com".to_string(),
            industry: None,
            competitors: vec![],
            report_type: ReportType::Weekly,
            date_range_days: 7,
            last_report_at: None,
            owner_id: None,
            min_articles: 0,
            use_deep_research: true,
        }
    }

    fn results(n: usize) -> Vec<SearchResult> {
        (0..n)
            .map(|i| SearchResult {
                title: format!("story {}", i),
                url: format!("https://news.example/{}", i),
                content: "body".to_string(),
                published_date: Some(Utc::now() - Duration::days(1)),
                score: None,
            })
            .collect()
    }

    #[test]
    fn parses_a_valid_selection() {
        let response = r#"{"selected": [
            {"index": 1, "category": "company_news", "reason": "launch"},
            {"index": 3, "category": "funding", "reason": "round"}
        ]}"#;
        let candidates = parse_selection(response, &results(4), &input());
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].category, ArticleCategory::CompanyNews);
        assert_eq!(candidates[1].source.url, "https://news.example/2");
    }

    #[test]
    fn duplicate_categories_keep_first_only() {
        let response = r#"{"selected": [
            {"index": 1, "category": "technology", "reason": "a"},
            {"index": 2, "category": "technology", "reason": "b"}
        ]}"#;
        let candidates = parse_selection(response, &results(3), &input());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source.url, "https://news.example/0");
    }

    #[test]
    fn out_of_range_and_duplicate_indexes_are_dropped() {
        let response = r#"{"selected": [
            {"index": 9, "category": "company_news", "reason": "x"},
            {"index": 2, "category": "funding", "reason": "y"},
            {"index": 2, "category": "opinion", "reason": "z"}
        ]}"#;
        let candidates = parse_selection(response, &results(3), &input());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].category, ArticleCategory::Funding);
    }

    #[test]
    fn items_before_the_cutoff_are_dropped() {
        let mut input = input();
        input.last_report_at = Some(Utc::now());
        let response = r#"{"selected": [{"index": 1, "category": "company_news", "reason": "old"}]}"#;
        let candidates = parse_selection(response, &results(1), &input);
        assert!(candidates.is_empty());
    }

    #[test]
    fn empty_and_unparseable_selections_yield_no_candidates() {
        assert!(parse_selection(r#"{"selected": []}"#, &results(2), &input()).is_empty());
        assert!(parse_selection("nothing newsworthy here", &results(2), &input()).is_empty());
    }

    #[test]
    fn selection_never_exceeds_target() {
        let items: Vec<String> = [
            "company_news",
            "competitor",
            "market_trend",
            "technology",
            "regulation",
            "funding",
            "product_launch",
        ]
        .iter()
        .enumerate()
        .map(|(i, c)| format!(r#"{{"index": {}, "category": "{}", "reason": "r"}}"#, i + 1, c))
        .collect();
        let response = format!(r#"{{"selected": [{}]}}"#, items.join(","));
        let candidates = parse_selection(&response, &results(8), &input());
        assert_eq!(candidates.len(), TARGET_ARTICLES);
    }
}
