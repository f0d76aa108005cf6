pub mod fetch;
pub mod orchestrator;
pub mod publish;
pub mod synthesize;

pub use orchestrator::{GeneratedReport, ReportRequest, generate_report};
