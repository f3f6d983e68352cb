use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{error, info};

use crate::{
    context::Context,
    error::Result,
    task::{NextAction, Task, TaskResult},
};

/// A linear pipeline of stages executed in insertion order.
///
/// Stages communicate through the shared [`Context`]; a stage returning
/// [`NextAction::End`] stops the run early (a first-class success path, used
/// for short-circuits like "nothing newsworthy"). A stage returning `Err`
/// aborts the run after the failure is recorded in the trace.
pub struct Pipeline {
    pub id: String,
    stages: Vec<Arc<dyn Task>>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stages: Vec::new(),
        }
    }

    pub fn add_stage(&mut self, stage: Arc<dyn Task>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_ids(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.id().to_string()).collect()
    }

    /// Run every stage in order until one ends the run or fails.
    pub async fn run(&self, context: Context) -> Result<PipelineOutcome> {
        for stage in &self.stages {
            let stage_id = stage.id().to_string();
            info!(pipeline = %self.id, stage = %stage_id, "starting stage");

            let started = Instant::now();
            let result = stage.run(context.clone()).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(TaskResult {
                    status,
                    next_action,
                }) => {
                    context.trace().record(
                        &stage_id,
                        Some(json!({
                            "duration_ms": elapsed_ms,
                            "status": status,
                        })),
                    );
                    if let Some(message) = &status {
                        info!(stage = %stage_id, "{}", message);
                    }
                    if matches!(next_action, NextAction::End) {
                        return Ok(PipelineOutcome::Ended(stage_id));
                    }
                }
                Err(e) => {
                    error!(stage = %stage_id, "stage failed: {}", e);
                    context.trace().record(
                        &stage_id,
                        Some(json!({
                            "duration_ms": elapsed_ms,
                            "error": e.to_string(),
                        })),
                    );
                    return Err(e);
                }
            }
        }
        Ok(PipelineOutcome::Completed)
    }
}

/// How a pipeline run finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every stage ran to completion
    Completed,
    /// A stage ended the run early; carries the id of that stage
    Ended(String),
}

/// Builder for assembling pipelines
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            pipeline: Pipeline::new(id),
        }
    }

    pub fn add_stage(mut self, stage: Arc<dyn Task>) -> Self {
        self.pipeline.add_stage(stage);
        self
    }

    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}
