pub mod llm;
pub mod report;
pub mod scanner;

pub use llm::{client_from_settings, CompletionRequest, LlmClient, LlmError, LlmSettings};
pub use scanner::{
    compliance_scanner::ComplianceScanner,
    extract::{extract_items, ItemKind, ItemSummary, ReportItem},
    Breakdown, ProgressSink, ReportScanner, ScanConfig, ScanError, ScanResponse, TokenInfo,
    TracingProgress, ViolationSet,
};
