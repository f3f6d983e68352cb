use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input record for one report run. Immutable for the duration of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInput {
    pub company_name: String,
    pub company_domain: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub report_type: ReportType,
    #[serde(default = "default_date_range_days")]
    pub date_range_days: u32,
    /// Cutoff: only developments after this timestamp are worth reporting
    #[serde(default)]
    pub last_report_at: Option<DateTime<Utc>>,
    /// Scopes the knowledge base; runs without an owner skip persistence
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub min_articles: usize,
    #[serde(default = "default_true")]
    pub use_deep_research: bool,
}

fn default_date_range_days() -> u32 {
    7
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl ReportType {
    pub fn label(&self) -> &'static str {
        match self {
            ReportType::Daily => "Daily",
            ReportType::Weekly => "Weekly",
            ReportType::Monthly => "Monthly",
        }
    }
}

/// One planned search query plus the model's stated reasoning for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub reasoning: String,
}

/// A raw web-search hit. `url` is the identity key for all deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Thematic category of a selected candidate. No two candidates in one run
/// share a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleCategory {
    CompanyNews,
    Competitor,
    MarketTrend,
    Technology,
    Regulation,
    Funding,
    ProductLaunch,
    Opinion,
}

impl ArticleCategory {
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase())).ok()
    }
}

/// A search result promoted by the selector for research and summarization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub source: SearchResult,
    pub category: ArticleCategory,
    #[serde(default)]
    pub reason: String,
}

/// A finished, citation-grounded article of the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArticle {
    pub id: String,
    pub title: String,
    /// 2-3 sentence summary
    pub summary: String,
    /// 300-500 word body with inline numbered citation markers
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Every url here is the candidate's primary url or one of its
    /// additional-source urls; hallucinated urls are filtered before this
    /// struct is built.
    pub sources: Vec<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub tag: ArticleCategory,
}

/// Per-stage timing extracted from the run trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub queries_planned: usize,
    pub results_found: usize,
    pub articles_selected: usize,
    /// The day window that actually produced results (widened on fallback)
    pub search_window_days: u32,
    pub duration_ms: u64,
    #[serde(default)]
    pub stage_timings: Vec<StageTiming>,
}

/// The pipeline's sole return value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub title: String,
    pub summary: String,
    pub articles: Vec<ReportArticle>,
    pub metadata: ReportMetadata,
}
