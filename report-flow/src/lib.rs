pub mod context;
pub mod error;
pub mod json;
pub mod pipeline;
pub mod task;
pub mod trace;

// Re-export commonly used types
pub use context::Context;
pub use error::{FlowError, Result};
pub use json::{JsonExtractError, extract_json, extract_json_as};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineOutcome};
pub use task::{NextAction, Task, TaskResult};
pub use trace::{RunTrace, TraceRecorder, TraceStep};
