pub mod clients;
pub mod knowledge;
pub mod models;
pub mod tasks;
pub mod workflow;

pub use knowledge::{CompanyKnowledge, InMemoryKnowledgeStorage, KnowledgeStorage, KnowledgeUpdate};
pub use models::*;
pub use report_flow::RunTrace;
pub use workflow::{GenerateError, ReportGenerator, ReportRun};
