use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};
use tracing::warn;

use super::{SearchClient, SearchOptions};
use crate::models::SearchResult;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Search client backed by the Tavily web-search API
pub struct TavilySearch {
    http: reqwest::Client,
    api_key: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("TAVILY_API_KEY")
            .map_err(|_| anyhow::anyhow!("TAVILY_API_KEY not set"))?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl SearchClient for TavilySearch {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> anyhow::Result<Vec<SearchResult>> {
        let mut body = json!({
            "query": query,
            "search_depth": options.depth.as_str(),
            "max_results": options.max_results,
        });
        if !options.exclude_domains.is_empty() {
            body["exclude_domains"] = json!(options.exclude_domains);
        }
        if let Some(days) = options.days {
            body["days"] = json!(days);
        }

        let response = self
            .http
            .post(TAVILY_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("search request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("search returned {}: {}", status, body));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("failed to parse search response: {}", e))?;

        let rows = payload
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("missing results array in search response"))?;

        let mut results = Vec::new();
        for row in rows {
            let url = row
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string();
            if url.is_empty() {
                warn!("dropping search hit without a url");
                continue;
            }
            results.push(SearchResult {
                title: row
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Untitled")
                    .to_string(),
                url,
                content: row
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                published_date: row
                    .get("published_date")
                    .and_then(|v| v.as_str())
                    .and_then(parse_published_date),
                score: row.get("score").and_then(|v| v.as_f64()),
            });
        }
        Ok(results)
    }
}

/// Tavily dates arrive either as RFC 3339 or as a bare `YYYY-MM-DD`
fn parse_published_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_bare_dates() {
        assert!(parse_published_date("2026-08-21T14:30:00Z").is_some());
        assert!(parse_published_date("2026-08-21").is_some());
        assert!(parse_published_date("last tuesday").is_none());
    }
}
