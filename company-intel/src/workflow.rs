use chrono::Utc;
use report_flow::{
    Context, FlowError, Pipeline, PipelineBuilder, PipelineOutcome, RunTrace, TraceRecorder,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::{BlobStore, CompletionClient, ImageClient, SearchClient};
use crate::knowledge::KnowledgeStorage;
use crate::models::{
    GeneratedReport, ReportArticle, ReportInput, ReportMetadata, SearchQuery, StageTiming,
};
use crate::tasks::{
    ExecuteSearchTask, PlanQueriesTask, SelectCandidatesTask, SynthesizeReportTask,
    UpdateKnowledgeTask, WriteArticlesTask, context_keys,
};

/// A finished run: the report plus the full trace of how it was produced
#[derive(Debug, Clone)]
pub struct ReportRun {
    pub report: GeneratedReport,
    pub trace: RunTrace,
}

/// A fatal run. The trace recorded up to (and including) the failing stage
/// rides along so failed runs stay inspectable.
#[derive(Debug)]
pub struct GenerateError {
    pub error: FlowError,
    pub trace: RunTrace,
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for GenerateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Builds and runs the research pipeline. Clients are constructed once by
/// the caller and shared read-only across every concurrent branch of a run.
pub struct ReportGenerator {
    completion: Arc<dyn CompletionClient>,
    search: Arc<dyn SearchClient>,
    knowledge: Arc<dyn KnowledgeStorage>,
    image: Option<Arc<dyn ImageClient>>,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl ReportGenerator {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        search: Arc<dyn SearchClient>,
        knowledge: Arc<dyn KnowledgeStorage>,
    ) -> Self {
        Self {
            completion,
            search,
            knowledge,
            image: None,
            blobs: None,
        }
    }

    /// Enable per-article illustrations
    pub fn with_illustrations(
        mut self,
        image: Arc<dyn ImageClient>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        self.image = Some(image);
        self.blobs = blobs;
        self
    }

    fn build_pipeline(&self) -> Pipeline {
        PipelineBuilder::new("company_intel_report")
            .add_stage(Arc::new(PlanQueriesTask::new(self.completion.clone())))
            .add_stage(Arc::new(ExecuteSearchTask::new(self.search.clone())))
            .add_stage(Arc::new(SelectCandidatesTask::new(self.completion.clone())))
            .add_stage(Arc::new(WriteArticlesTask::new(
                self.completion.clone(),
                self.search.clone(),
                self.image.clone(),
                self.blobs.clone(),
            )))
            .add_stage(Arc::new(SynthesizeReportTask::new(self.completion.clone())))
            .add_stage(Arc::new(UpdateKnowledgeTask::new(
                self.completion.clone(),
                self.knowledge.clone(),
            )))
            .build()
    }

    /// Run one full report generation.
    ///
    /// Only two conditions abort the run: an empty query plan and zero
    /// search results after every widening fallback. Everything else
    /// degrades inside its stage. "No news" is a success: a report with an
    /// empty article list, never an error.
    pub async fn generate(
        &self,
        input: ReportInput,
    ) -> std::result::Result<ReportRun, GenerateError> {
        let input_value = serde_json::to_value(&input).unwrap_or(serde_json::Value::Null);
        let trace = TraceRecorder::new(input_value);
        let context = Context::new(trace.clone());

        info!(company = %input.company_name, "starting report generation");

        // Knowledge read failures degrade to running without prior context
        if let Some(owner_id) = &input.owner_id {
            match self.knowledge.get(owner_id).await {
                Ok(Some(knowledge)) => context.set(context_keys::KNOWLEDGE, knowledge).await,
                Ok(None) => {}
                Err(e) => warn!(owner = %owner_id, "knowledge load failed: {}", e),
            }
        }
        context.set(context_keys::INPUT, &input).await;

        let outcome = match self.build_pipeline().run(context.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                trace.finish();
                return Err(GenerateError {
                    error: e,
                    trace: trace.snapshot(),
                });
            }
        };

        let report = assemble_report(&input, &context, &trace, &outcome).await;
        trace.finish();

        info!(
            company = %input.company_name,
            articles = report.articles.len(),
            "report generation finished"
        );
        Ok(ReportRun {
            report,
            trace: trace.snapshot(),
        })
    }
}

async fn assemble_report(
    input: &ReportInput,
    context: &Context,
    trace: &TraceRecorder,
    outcome: &PipelineOutcome,
) -> GeneratedReport {
    let queries: Vec<SearchQuery> = context.get(context_keys::QUERIES).await.unwrap_or_default();
    let results_found: usize = context
        .get(context_keys::RESULTS_FOUND)
        .await
        .unwrap_or_default();
    let search_window_days: u32 = context
        .get(context_keys::SEARCH_WINDOW_DAYS)
        .await
        .unwrap_or(input.date_range_days);
    let candidates: Vec<serde_json::Value> = context
        .get(context_keys::CANDIDATES)
        .await
        .unwrap_or_default();
    let articles: Vec<ReportArticle> = context.get(context_keys::ARTICLES).await.unwrap_or_default();

    let short_circuited = matches!(outcome, PipelineOutcome::Ended(_));
    let (title, summary) = if short_circuited {
        (
            format!("{}: No New Updates", input.company_name),
            format!(
                "No significant developments were found for {} within the last {} days.",
                input.company_name, search_window_days
            ),
        )
    } else {
        (
            context
                .get(context_keys::REPORT_TITLE)
                .await
                .unwrap_or_else(|| {
                    format!("{} {} Intelligence", input.company_name, input.report_type.label())
                }),
            context
                .get(context_keys::REPORT_SUMMARY)
                .await
                .unwrap_or_default(),
        )
    };

    let snapshot = trace.snapshot();
    let stage_timings: Vec<StageTiming> = snapshot
        .steps
        .iter()
        .filter_map(|step| {
            let duration_ms = step.data.as_ref()?.get("duration_ms")?.as_u64()?;
            Some(StageTiming {
                stage: step.stage.clone(),
                duration_ms,
            })
        })
        .collect();
    let duration_ms = Utc::now()
        .signed_duration_since(trace.started_at())
        .num_milliseconds()
        .max(0) as u64;

    GeneratedReport {
        title,
        summary,
        metadata: ReportMetadata {
            queries_planned: queries.len(),
            results_found,
            articles_selected: candidates.len(),
            search_window_days,
            duration_ms,
            stage_timings,
        },
        articles,
    }
}
