use async_trait::async_trait;
use report_flow::{Context, NextAction, Result, Task, TaskResult, extract_json_as};
use std::sync::Arc;
use tracing::{info, warn};

use super::context_keys;
use crate::clients::CompletionClient;
use crate::knowledge::{CompanyKnowledge, KnowledgeStorage, KnowledgeUpdate};
use crate::models::{ReportArticle, ReportInput};

/// Extracts what the finished report taught us about the company and merges
/// it into the owner's knowledge record. Any failure here is logged and
/// absorbed; knowledge maintenance never fails a report run.
pub struct UpdateKnowledgeTask {
    completion: Arc<dyn CompletionClient>,
    storage: Arc<dyn KnowledgeStorage>,
}

impl UpdateKnowledgeTask {
    pub fn new(completion: Arc<dyn CompletionClient>, storage: Arc<dyn KnowledgeStorage>) -> Self {
        Self {
            completion,
            storage,
        }
    }

    async fn extract_and_merge(
        &self,
        owner_id: &str,
        input: &ReportInput,
        articles: &[ReportArticle],
        context: &Context,
    ) -> anyhow::Result<()> {
        let prompt = build_extraction_prompt(input, articles);
        let response = self.completion.complete(&prompt, 1000).await?;
        context
            .trace()
            .record_exchange("update_knowledge", &prompt, &response);

        let update: KnowledgeUpdate = extract_json_as(&response)
            .map_err(|e| anyhow::anyhow!("unparseable knowledge extraction: {}", e))?;

        let mut knowledge = self
            .storage
            .get(owner_id)
            .await?
            .unwrap_or_else(|| CompanyKnowledge::from_input(input));
        knowledge.merge(update);
        self.storage.upsert(owner_id, knowledge).await?;

        info!(owner = %owner_id, "knowledge base merged");
        Ok(())
    }

    /// The first run for an owner creates the record even when nothing was
    /// published, so later runs start from the input's own fields.
    async fn ensure_record(&self, owner_id: &str, input: &ReportInput) -> anyhow::Result<()> {
        if self.storage.get(owner_id).await?.is_none() {
            self.storage
                .upsert(owner_id, CompanyKnowledge::from_input(input))
                .await?;
            info!(owner = %owner_id, "knowledge record created");
        }
        Ok(())
    }
}

#[async_trait]
impl Task for UpdateKnowledgeTask {
    fn id(&self) -> &str {
        "update_knowledge"
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let input: Option<ReportInput> = context.get(context_keys::INPUT).await;
        let articles: Vec<ReportArticle> = context
            .get(context_keys::ARTICLES)
            .await
            .unwrap_or_default();

        let Some(input) = input else {
            warn!("input missing from context, skipping knowledge update");
            return Ok(TaskResult::new(None, NextAction::Continue));
        };
        let Some(owner_id) = input.owner_id.clone() else {
            return Ok(TaskResult::new(
                Some("no owner, knowledge update skipped".to_string()),
                NextAction::Continue,
            ));
        };
        if articles.is_empty() {
            let status = match self.ensure_record(&owner_id, &input).await {
                Ok(()) => "no articles, knowledge record ensured",
                Err(e) => {
                    warn!(owner = %owner_id, "knowledge record creation failed: {}", e);
                    "knowledge update failed, continuing"
                }
            };
            return Ok(TaskResult::new(
                Some(status.to_string()),
                NextAction::Continue,
            ));
        }

        let status = match self
            .extract_and_merge(&owner_id, &input, &articles, &context)
            .await
        {
            Ok(()) => "knowledge base updated",
            Err(e) => {
                warn!(owner = %owner_id, "knowledge update failed: {}", e);
                "knowledge update failed, continuing"
            }
        };

        Ok(TaskResult::new(
            Some(status.to_string()),
            NextAction::Continue,
        ))
    }
}

fn build_extraction_prompt(input: &ReportInput, articles: &[ReportArticle]) -> String {
    let mut briefs = String::new();
    for article in articles {
        briefs.push_str(&format!("- {}\n  {}\n", article.title, article.summary));
    }

    format!(
        r#"Extract durable knowledge about {company} from this report. Only record information the report actually supports; for any field the report says nothing new about, return null.

Report articles:
{briefs}
Return a JSON object exactly like:
{{"competitors": ["..."] | null,
  "market_position": "..." | null,
  "key_products": ["..."] | null,
  "strategic_focus": ["..."] | null,
  "new_developments": ["..."] | null,
  "competitive_insights": {{"<competitor>": "<insight>"}} | null}}
Return only the JSON object."#,
        company = input.company_name,
        briefs = briefs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::InMemoryKnowledgeStorage;
    use crate::models::{ArticleCategory, ReportType};
    use report_flow::TraceRecorder;

    struct FailingCompletion;

    #[async_trait]
    impl CompletionClient for FailingCompletion {
        async fn complete(&self, _prompt: &str, _max_tokens: u64) -> anyhow::Result<String> {
            anyhow::bail!("model unavailable")
        }
    }

    fn input() -> ReportInput {
        ReportInput {
            company_name: "Acme".to_string(),
            company_domain: "acme.com".to_string(),
            industry: None,
            competitors: vec![],
            report_type: ReportType::Weekly,
            date_range_days: 7,
            last_report_at: None,
            owner_id: Some("o".to_string()),
            min_articles: 0,
            use_deep_research: true,
        }
    }

    fn articles() -> Vec<ReportArticle> {
        vec![ReportArticle {
            id: "1".to_string(),
            title: "Acme ships v2".to_string(),
            summary: "The flagship product got a major release.".to_string(),
            content: String::new(),
            image_url: None,
            sources: vec!["https://real.example/a".to_string()],
            published_at: None,
            tag: ArticleCategory::ProductLaunch,
        }]
    }

    #[test]
    fn extraction_prompt_lists_articles_and_null_contract() {
        let prompt = build_extraction_prompt(&input(), &articles());
        assert!(prompt.contains("Acme ships v2"));
        assert!(prompt.contains("return null"));
    }

    #[tokio::test]
    async fn extraction_failure_reports_a_failed_status() {
        let storage = Arc::new(InMemoryKnowledgeStorage::new());
        let task = UpdateKnowledgeTask::new(Arc::new(FailingCompletion), storage);
        let context = Context::new(TraceRecorder::new(serde_json::Value::Null));
        context.set(context_keys::INPUT, input()).await;
        context.set(context_keys::ARTICLES, articles()).await;

        let result = task.run(context).await.unwrap();
        assert_eq!(
            result.status.as_deref(),
            Some("knowledge update failed, continuing")
        );
    }

    #[tokio::test]
    async fn zero_article_run_still_creates_the_knowledge_record() {
        let storage = Arc::new(InMemoryKnowledgeStorage::new());
        let task = UpdateKnowledgeTask::new(Arc::new(FailingCompletion), storage.clone());
        let context = Context::new(TraceRecorder::new(serde_json::Value::Null));
        context.set(context_keys::INPUT, input()).await;

        let result = task.run(context).await.unwrap();
        assert_eq!(
            result.status.as_deref(),
            Some("no articles, knowledge record ensured")
        );

        let record = storage.get("o").await.unwrap().expect("record created");
        assert_eq!(record.company_name, "Acme");
        assert!(record.recent_developments.is_empty());
    }

    #[tokio::test]
    async fn existing_record_survives_a_zero_article_run() {
        let storage = Arc::new(InMemoryKnowledgeStorage::new());
        let mut existing = CompanyKnowledge::from_input(&input());
        existing.recent_developments.push("shipped v1".to_string());
        storage.upsert("o", existing).await.unwrap();

        let task = UpdateKnowledgeTask::new(Arc::new(FailingCompletion), storage.clone());
        let context = Context::new(TraceRecorder::new(serde_json::Value::Null));
        context.set(context_keys::INPUT, input()).await;
        task.run(context).await.unwrap();

        let record = storage.get("o").await.unwrap().expect("record kept");
        assert_eq!(record.recent_developments, vec!["shipped v1".to_string()]);
    }
}
