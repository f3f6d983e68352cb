use async_trait::async_trait;
use futures::future::join_all;
use report_flow::{Context, FlowError, NextAction, Result, Task, TaskResult, extract_json_as};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{context_keys, deep_research::research_candidate, truncate_chars};
use crate::clients::{BlobStore, CompletionClient, GeneratedImage, ImageClient, SearchClient};
use crate::knowledge::CompanyKnowledge;
use crate::models::{Candidate, ReportArticle, ReportInput, SearchResult};

const SOURCE_SNIPPET_CHARS: usize = 1500;

/// Per candidate, concurrently: run the deep-research session, write a
/// citation-grounded article, and (when an image client is wired in) start
/// the illustration as soon as that article is done. A branch failure drops
/// that article only; siblings proceed.
pub struct WriteArticlesTask {
    completion: Arc<dyn CompletionClient>,
    search: Arc<dyn SearchClient>,
    image: Option<Arc<dyn ImageClient>>,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl WriteArticlesTask {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        search: Arc<dyn SearchClient>,
        image: Option<Arc<dyn ImageClient>>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        Self {
            completion,
            search,
            image,
            blobs,
        }
    }

    async fn write_one(
        &self,
        candidate: &Candidate,
        input: &ReportInput,
        knowledge: Option<&CompanyKnowledge>,
        context: &Context,
    ) -> Option<ReportArticle> {
        let additional = if input.use_deep_research {
            research_candidate(
                self.completion.as_ref(),
                self.search.as_ref(),
                candidate,
                input,
                context.trace(),
            )
            .await
        } else {
            Vec::new()
        };

        let mut article = match summarize_candidate(
            self.completion.as_ref(),
            candidate,
            &additional,
            input,
            knowledge,
            context,
        )
        .await
        {
            Ok(article) => article,
            Err(e) => {
                warn!(url = %candidate.source.url, "dropping article: {}", e);
                return None;
            }
        };

        if let Some(image) = &self.image {
            illustrate_article(image.as_ref(), self.blobs.as_deref(), &mut article).await;
        }
        Some(article)
    }
}

#[async_trait]
impl Task for WriteArticlesTask {
    fn id(&self) -> &str {
        "write_articles"
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let input: ReportInput = context
            .get(context_keys::INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("input not found in context".to_string()))?;
        let candidates: Vec<Candidate> = context
            .get(context_keys::CANDIDATES)
            .await
            .ok_or_else(|| FlowError::ContextError("candidates not found in context".to_string()))?;
        let knowledge: Option<CompanyKnowledge> = context.get(context_keys::KNOWLEDGE).await;

        let articles: Vec<ReportArticle> = join_all(
            candidates
                .iter()
                .map(|c| self.write_one(c, &input, knowledge.as_ref(), &context)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        info!(
            written = articles.len(),
            candidates = candidates.len(),
            "article writing complete"
        );
        let status = format!("wrote {} of {} articles", articles.len(), candidates.len());
        context.set(context_keys::ARTICLES, &articles).await;

        Ok(TaskResult::new(Some(status), NextAction::Continue))
    }
}

#[derive(Debug, Deserialize)]
struct ArticleResponse {
    title: String,
    summary: String,
    content: String,
    #[serde(default)]
    sources: Vec<String>,
}

/// One grounded-summarization call plus the mandatory post-hoc citation
/// validation. Any url the model cites that was not actually supplied is
/// discarded; an article can never cite a url the pipeline has not seen.
async fn summarize_candidate(
    completion: &dyn CompletionClient,
    candidate: &Candidate,
    additional: &[SearchResult],
    input: &ReportInput,
    knowledge: Option<&CompanyKnowledge>,
    context: &Context,
) -> anyhow::Result<ReportArticle> {
    let prompt = build_article_prompt(candidate, additional, input, knowledge);
    let response = completion.complete(&prompt, 2000).await?;
    context
        .trace()
        .record_exchange("write_articles", &prompt, &response);

    let parsed: ArticleResponse = extract_json_as(&response)
        .map_err(|e| anyhow::anyhow!("unparseable article response: {}", e))?;

    let sources = validate_sources(parsed.sources, &candidate.source.url, additional);

    Ok(ReportArticle {
        id: Uuid::new_v4().to_string(),
        title: parsed.title,
        summary: parsed.summary,
        content: parsed.content,
        image_url: None,
        sources,
        published_at: candidate.source.published_date,
        tag: candidate.category,
    })
}

/// Keep only urls that exactly match the primary source or one of the
/// additional sources. If nothing survives, the primary url is the
/// guaranteed fallback.
fn validate_sources(
    cited: Vec<String>,
    primary_url: &str,
    additional: &[SearchResult],
) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for url in cited {
        let url = url.trim();
        let supplied =
            url == primary_url || additional.iter().any(|s| s.url == url);
        if !supplied {
            warn!(url = %url, "discarding hallucinated citation");
            continue;
        }
        if !kept.iter().any(|k| k == url) {
            kept.push(url.to_string());
        }
    }
    if kept.is_empty() {
        kept.push(primary_url.to_string());
    }
    kept
}

fn build_article_prompt(
    candidate: &Candidate,
    additional: &[SearchResult],
    input: &ReportInput,
    knowledge: Option<&CompanyKnowledge>,
) -> String {
    let mut sources = format!(
        "1. {} ({})\n   {}\n",
        candidate.source.title,
        candidate.source.url,
        truncate_chars(&candidate.source.content, SOURCE_SNIPPET_CHARS)
    );
    for (i, source) in additional.iter().enumerate() {
        sources.push_str(&format!(
            "{}. {} ({})\n   {}\n",
            i + 2,
            source.title,
            source.url,
            truncate_chars(&source.content, SOURCE_SNIPPET_CHARS)
        ));
    }

    let context_block = knowledge
        .map(|k| format!("\n{}\n", k.prompt_context()))
        .unwrap_or_default();

    let collision_note = if input.competitors.is_empty() {
        String::new()
    } else {
        format!(
            "\nNaming caution: if a competitor ({}) offers a product whose name matches or resembles \"{}\", attribute it to the competitor explicitly and never to {}.\n",
            input.competitors.join(", "),
            input.company_name,
            input.company_name
        )
    };

    format!(
        r#"Write one article for a competitive-intelligence report on {company}.
{context_block}
Numbered sources (the only material you may use):
{sources}
Grounding rules:
- Every claim must be traceable to one of the numbered sources above.
- Cite with inline markers like [1] or [2], roughly 3-5 citations across the article — never after every sentence.
- Never invent a URL. The "sources" array may only contain URLs listed above.
{collision_note}
Return a JSON object exactly like:
{{"title": "...", "summary": "2-3 sentence summary", "content": "300-500 word article with [n] markers", "sources": ["url", "..."]}}
Return only the JSON object."#,
        company = input.company_name,
        context_block = context_block,
        sources = sources,
        collision_note = collision_note,
    )
}

/// Builds an abstract, non-literal visual prompt and attaches the stored
/// image url. Any failure leaves the article unillustrated and never touches
/// sibling branches.
async fn illustrate_article(
    image: &dyn ImageClient,
    blobs: Option<&dyn BlobStore>,
    article: &mut ReportArticle,
) {
    let prompt = build_image_prompt(&article.title, &article.summary);
    let generated = match image.generate(&prompt).await {
        Ok(g) => g,
        Err(e) => {
            warn!(article = %article.title, "image generation failed: {}", e);
            return;
        }
    };

    let url = match (blobs, generated) {
        (Some(store), generated) => match store.store(generated).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(article = %article.title, "image storage failed: {}", e);
                None
            }
        },
        // Without a blob store a hosted url is usable as-is, raw bytes are not
        (None, GeneratedImage::HostedUrl(url)) => Some(url),
        (None, GeneratedImage::Bytes(_)) => {
            warn!(article = %article.title, "no blob store configured, skipping image bytes");
            None
        }
    };
    article.image_url = url;
}

fn build_image_prompt(title: &str, summary: &str) -> String {
    format!(
        "An abstract editorial illustration evoking the theme of \"{}\". {} \
         Non-literal, no text, no logos, no recognizable people; muted \
         professional palette, geometric shapes and light.",
        title,
        truncate_chars(summary, 200)
    )
}
