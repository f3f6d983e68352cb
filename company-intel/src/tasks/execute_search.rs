use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::future::join_all;
use report_flow::{Context, FlowError, NextAction, Result, Task, TaskResult};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{context_keys, excluded_domains};
use crate::clients::{SearchClient, SearchDepth, SearchOptions};
use crate::models::{ReportInput, SearchQuery, SearchResult};

/// Day windows tried in order when earlier ones come back empty. The final
/// window effectively means "all time".
const FALLBACK_WINDOWS: &[u32] = &[30, 365];
const ALL_TIME_DAYS: u32 = 365;
const RESULTS_PER_QUERY: usize = 5;

/// Fans all planned queries out to the search client, widening the day
/// window until something comes back. Zero results after the widest window
/// is fatal for the run.
pub struct ExecuteSearchTask {
    search: Arc<dyn SearchClient>,
}

impl ExecuteSearchTask {
    pub fn new(search: Arc<dyn SearchClient>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Task for ExecuteSearchTask {
    fn id(&self) -> &str {
        "execute_search"
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let input: ReportInput = context
            .get(context_keys::INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("input not found in context".to_string()))?;
        let queries: Vec<SearchQuery> = context
            .get(context_keys::QUERIES)
            .await
            .ok_or_else(|| FlowError::ContextError("queries not found in context".to_string()))?;

        for window in widening_windows(input.date_range_days) {
            let results = run_batch(self.search.as_ref(), &queries, window).await;
            context.trace().record(
                self.id(),
                Some(json!({
                    "window_days": window,
                    "results": results.len(),
                })),
            );

            if results.is_empty() {
                warn!(window_days = window, "no search results, widening window");
                continue;
            }

            info!(
                window_days = window,
                results = results.len(),
                "search batch complete"
            );
            let status = format!("{} results within {} days", results.len(), window);
            context
                .set(context_keys::RESULTS_FOUND, results.len())
                .await;
            context.set(context_keys::SEARCH_WINDOW_DAYS, window).await;
            context.set(context_keys::SEARCH_RESULTS, &results).await;
            return Ok(TaskResult::new(Some(status), NextAction::Continue));
        }

        Err(FlowError::StageFailed(format!(
            "no search results for {} even after widening to {} days",
            input.company_name, ALL_TIME_DAYS
        )))
    }
}

/// The configured window first, then each strictly wider fallback
fn widening_windows(date_range_days: u32) -> Vec<u32> {
    let mut windows = vec![date_range_days.max(1)];
    for &fallback in FALLBACK_WINDOWS {
        if fallback > *windows.last().unwrap() {
            windows.push(fallback);
        }
    }
    windows
}

/// One concurrent fan-out over all queries. Per-query failures degrade to
/// zero results for that query and never abort the batch.
async fn run_batch(
    search: &dyn SearchClient,
    queries: &[SearchQuery],
    window_days: u32,
) -> Vec<SearchResult> {
    let options = SearchOptions {
        depth: SearchDepth::Advanced,
        max_results: RESULTS_PER_QUERY,
        exclude_domains: excluded_domains(),
        days: (window_days < ALL_TIME_DAYS).then_some(window_days),
    };

    let batches = join_all(queries.iter().map(|q| {
        let options = options.clone();
        async move {
            match search.search(&q.query, &options).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(query = %q.query, "search query failed: {}", e);
                    Vec::new()
                }
            }
        }
    }))
    .await;

    let flattened: Vec<SearchResult> = batches.into_iter().flatten().collect();
    filter_by_date(flattened, window_days)
}

/// Items with a known publish date must fall inside the window; undated
/// items pass through because the search service already applied the day
/// filter upstream.
fn filter_by_date(results: Vec<SearchResult>, window_days: u32) -> Vec<SearchResult> {
    if window_days >= ALL_TIME_DAYS {
        return results;
    }
    let cutoff = Utc::now() - Duration::days(window_days as i64);
    results
        .into_iter()
        .filter(|r| r.published_date.is_none_or(|d| d >= cutoff))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(url: &str, days_ago: Option<i64>) -> SearchResult {
        SearchResult {
            title: "t".to_string(),
            url: url.to_string(),
            content: "c".to_string(),
            published_date: days_ago.map(|d| Utc::now() - Duration::days(d)),
            score: None,
        }
    }

    #[test]
    fn windows_widen_strictly() {
        assert_eq!(widening_windows(7), vec![7, 30, 365]);
        assert_eq!(widening_windows(30), vec![30, 365]);
        assert_eq!(widening_windows(90), vec![90, 365]);
        assert_eq!(widening_windows(400), vec![400]);
    }

    #[test]
    fn stale_dated_results_are_filtered() {
        let results = vec![
            result("https://a.example/new", Some(2)),
            result("https://a.example/old", Some(40)),
            result("https://a.example/undated", None),
        ];
        let kept = filter_by_date(results, 7);
        let urls: Vec<&str> = kept.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/new", "https://a.example/undated"]);
    }

    #[test]
    fn all_time_window_skips_date_filter() {
        let results = vec![result("https://a.example/old", Some(400))];
        assert_eq!(filter_by_date(results, 365).len(), 1);
    }

    struct FlakySearch;

    #[async_trait]
    impl SearchClient for FlakySearch {
        async fn search(
            &self,
            query: &str,
            _options: &SearchOptions,
        ) -> anyhow::Result<Vec<SearchResult>> {
            if query.contains("boom") {
                anyhow::bail!("provider outage");
            }
            Ok(vec![result(&format!("https://hit.example/{}", query), Some(1))])
        }
    }

    #[tokio::test]
    async fn failed_query_does_not_abort_the_batch() {
        let queries = vec![
            SearchQuery {
                query: "good".to_string(),
                reasoning: String::new(),
            },
            SearchQuery {
                query: "boom".to_string(),
                reasoning: String::new(),
            },
        ];
        let results = run_batch(&FlakySearch, &queries, 7).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://hit.example/good");
    }
}
