use async_trait::async_trait;
use report_flow::{Context, FlowError, NextAction, Result, Task, TaskResult, extract_json_as};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::context_keys;
use crate::clients::CompletionClient;
use crate::models::{ReportArticle, ReportInput};

/// Produces the report title and executive summary from the finished
/// articles. Synthesis never fails the run: an unusable response degrades to
/// a templated title and a summary assembled from the article summaries.
pub struct SynthesizeReportTask {
    completion: Arc<dyn CompletionClient>,
}

impl SynthesizeReportTask {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Task for SynthesizeReportTask {
    fn id(&self) -> &str {
        "synthesize_report"
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let input: ReportInput = context
            .get(context_keys::INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("input not found in context".to_string()))?;
        let articles: Vec<ReportArticle> = context
            .get(context_keys::ARTICLES)
            .await
            .unwrap_or_default();

        let (title, summary) = if articles.is_empty() {
            // Every candidate was dropped during writing; degrade rather than
            // synthesize over nothing
            (fallback_title(&input), fallback_summary(&articles))
        } else {
            let prompt = build_synthesis_prompt(&articles, &input);
            match self.completion.complete(&prompt, 1500).await {
                Ok(response) => {
                    context.trace().record_exchange(self.id(), &prompt, &response);
                    parse_synthesis(&response, &input)
                }
                Err(e) => {
                    warn!("synthesis call failed: {}", e);
                    (fallback_title(&input), fallback_summary(&articles))
                }
            }
        };

        context.set(context_keys::REPORT_TITLE, &title).await;
        context.set(context_keys::REPORT_SUMMARY, &summary).await;

        Ok(TaskResult::new(
            Some(format!("synthesized report: {}", title)),
            NextAction::Continue,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct Synthesis {
    title: String,
    summary: String,
}

fn build_synthesis_prompt(articles: &[ReportArticle], input: &ReportInput) -> String {
    let mut briefs = String::new();
    for (i, article) in articles.iter().enumerate() {
        briefs.push_str(&format!("{}. {}\n   {}\n", i + 1, article.title, article.summary));
    }

    format!(
        r#"You are finishing a {cadence} competitive-intelligence report on {company}.

Article briefs (your ONLY source material — introduce no facts that are not in them):
{briefs}
Write:
- a title of 5-10 words
- an executive summary with a short bulleted "Key insights" section followed by a prose "Strategic context" paragraph

Return a JSON object exactly like:
{{"title": "...", "summary": "..."}}
Return only the JSON object."#,
        cadence = input.report_type.label().to_lowercase(),
        company = input.company_name,
        briefs = briefs,
    )
}

/// JSON-parse failure falls back to the raw response as the summary
fn parse_synthesis(response: &str, input: &ReportInput) -> (String, String) {
    match extract_json_as::<Synthesis>(response) {
        Ok(s) => (s.title, s.summary),
        Err(e) => {
            warn!("could not parse synthesis response: {}", e);
            (fallback_title(input), response.trim().to_string())
        }
    }
}

fn fallback_title(input: &ReportInput) -> String {
    format!(
        "{} {} Intelligence",
        input.company_name,
        input.report_type.label()
    )
}

fn fallback_summary(articles: &[ReportArticle]) -> String {
    if articles.is_empty() {
        return "No articles could be written for this report.".to_string();
    }
    articles
        .iter()
        .map(|a| format!("- {}: {}", a.title, a.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportType;

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

    #[test]
    fn parses_title_and_summary() {
        let (title, summary) = parse_synthesis(
            r#"{"title": "Acme Gains Ground", "summary": "Key insights:\n- growth"}"#,
            &input(),
        );
        assert_eq!(title, "Acme Gains Ground");
        assert!(summary.contains("growth"));
    }

    #[test]
    fn unparseable_response_becomes_the_summary() {
        let raw = "Acme had a strong week across all fronts.";
        let (title, summary) = parse_synthesis(raw, &input());
        assert_eq!(title, "Acme Weekly Intelligence");
        assert_eq!(summary, raw);
    }
}
