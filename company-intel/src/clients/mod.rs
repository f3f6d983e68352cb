//! External service collaborators, consumed through traits so the pipeline
//! can be driven by stubs in tests. Production implementations are explicit
//! objects constructed once at startup and shared by reference across all
//! concurrent branches; no client mutates shared state per call.

mod images;
mod openrouter;
mod tavily;

pub use images::{FsBlobStore, OpenAiImage};
pub use openrouter::OpenRouterCompletion;
pub use tavily::TavilySearch;

use async_trait::async_trait;

use crate::models::SearchResult;

/// Single-turn, non-streaming text completion
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u64) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDepth {
    Basic,
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub depth: SearchDepth,
    pub max_results: usize,
    pub exclude_domains: Vec<String>,
    /// Restrict results to the last N days; `None` means all time
    pub days: Option<u32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            depth: SearchDepth::Advanced,
            max_results: 5,
            exclude_domains: Vec::new(),
            days: None,
        }
    }
}

/// Keyword web search
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, options: &SearchOptions)
    -> anyhow::Result<Vec<SearchResult>>;
}

/// Output of an image generation call: either raw bytes or an ephemeral url
/// hosted by the provider. Either way it goes through a [`BlobStore`] to
/// become durable.
#[derive(Debug, Clone)]
pub enum GeneratedImage {
    Bytes(Vec<u8>),
    HostedUrl(String),
}

#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<GeneratedImage>;
}

/// Makes ephemeral generated images durable, returning a stable url
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, image: GeneratedImage) -> anyhow::Result<String>;
}
