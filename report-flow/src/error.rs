use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("stage not found: {0}")]
    StageNotFound(String),

    #[error("context error: {0}")]
    ContextError(String),

    #[error("stage execution failed: {0}")]
    StageFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
