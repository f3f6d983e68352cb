use async_trait::async_trait;
use rig::client::CompletionClient as _;
use rig::completion::Prompt;
use rig::providers::openrouter;

use super::CompletionClient;

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Completion client backed by OpenRouter via rig
pub struct OpenRouterCompletion {
    client: openrouter::Client,
    model: String,
}

impl OpenRouterCompletion {
    pub fn new(api_key: &str, model: Option<String>) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
        let model = std::env::var("COMPLETION_MODEL").ok();
        Ok(Self::new(&api_key, model))
    }
}

#[async_trait]
impl CompletionClient for OpenRouterCompletion {
    async fn complete(&self, prompt: &str, max_tokens: u64) -> anyhow::Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble("You are a competitive-intelligence research analyst.")
            .max_tokens(max_tokens)
            .build();
        let response = agent.prompt(prompt).await?;
        Ok(response)
    }
}
