pub mod deep_research;
pub mod execute_search;
pub mod plan_queries;
pub mod select_candidates;
pub mod synthesize_report;
pub mod update_knowledge;
pub mod write_articles;

pub use execute_search::ExecuteSearchTask;
pub use plan_queries::PlanQueriesTask;
pub use select_candidates::SelectCandidatesTask;
pub use synthesize_report::SynthesizeReportTask;
pub use update_knowledge::UpdateKnowledgeTask;
pub use write_articles::WriteArticlesTask;

/// Context keys shared between pipeline stages
pub mod context_keys {
    pub const INPUT: &str = "input";
    pub const KNOWLEDGE: &str = "knowledge";
    pub const QUERIES: &str = "queries";
    pub const SEARCH_RESULTS: &str = "search_results";
    pub const RESULTS_FOUND: &str = "results_found";
    pub const SEARCH_WINDOW_DAYS: &str = "search_window_days";
    pub const CANDIDATES: &str = "candidates";
    pub const ARTICLES: &str = "articles";
    pub const REPORT_TITLE: &str = "report_title";
    pub const REPORT_SUMMARY: &str = "report_summary";
}

/// Forum and video domains excluded from every web search
pub(crate) const EXCLUDED_DOMAINS: &[&str] = &[
    "reddit.com",
    "quora.com",
    "youtube.com",
    "tiktok.com",
    "facebook.com",
    "twitter.com",
    "x.com",
];

pub(crate) fn excluded_domains() -> Vec<String> {
    EXCLUDED_DOMAINS.iter().map(|d| d.to_string()).collect()
}

/// Char-boundary-safe truncation for embedding snippets in prompts
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
