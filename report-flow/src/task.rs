use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{context::Context, error::Result};

/// Result of a stage execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Human-readable status for logs and the trace
    pub status: Option<String>,
    /// What the pipeline should do next
    pub next_action: NextAction,
}

impl TaskResult {
    pub fn new(status: Option<String>, next_action: NextAction) -> Self {
        Self {
            status,
            next_action,
        }
    }
}

/// Defines what should happen after a stage completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NextAction {
    /// Continue to the next stage in the pipeline
    Continue,
    /// End the run early; remaining stages are skipped
    End,
}

/// Core trait that all pipeline stages must implement
#[async_trait]
pub trait Task: Send + Sync {
    /// Unique identifier for this stage
    fn id(&self) -> &str;

    /// Execute the stage with the given context
    async fn run(&self, context: Context) -> Result<TaskResult>;
}
