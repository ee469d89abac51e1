use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

pub mod aggregate;
pub mod budget;
pub mod compliance_scanner;
pub mod extract;
pub mod violations;

/// Item identifier → up to three categorized violation lines.
pub type ViolationSet = BTreeMap<String, Vec<String>>;

/// Tunable limits for a compliance scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Ceiling on estimated tokens for the whole request payload.
    pub max_input_tokens: usize,
    /// Ceiling on estimated tokens for a single item summary.
    pub max_item_tokens: usize,
    /// `max_tokens` sent with every completion request.
    pub max_response_tokens: u32,
    /// Items analyzed concurrently; batches run one after another.
    pub batch_size: usize,
    pub temperature: f32,
    pub inquiry_lookback_months: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 100_000,
            max_item_tokens: 1_000,
            max_response_tokens: 1_000,
            batch_size: 5,
            temperature: 0.3,
            inquiry_lookback_months: 36,
        }
    }
}

/// Request-wide scan failures. Item-level failures never surface here.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("INPUT_TOO_LARGE: {tokens} tokens exceeds limit of {limit}")]
    InputTooLarge { tokens: usize, limit: usize },
    #[error("completion quota exhausted: {0}")]
    QuotaExceeded(String),
    #[error("credit report is not valid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl ScanError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InputTooLarge { .. } => "INPUT_TOO_LARGE",
            Self::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            Self::InvalidPayload(_) => "AI_SCAN_FAILED",
        }
    }
}

/// Keys counted per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub accounts: usize,
    pub public_records: usize,
    pub inquiries: usize,
}

/// Diagnostics separating model-derived results from fallback ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub input_tokens: usize,
    #[serde(rename = "itemsAnalyzedWithAI")]
    pub items_analyzed_with_ai: usize,
    pub items_skipped_by_tokens: usize,
    pub total_items_processed: usize,
    pub items_using_fallback: usize,
    pub fallback_used: bool,
}

/// Wire shape returned by the scan endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    pub total_violations: usize,
    pub affected_accounts: usize,
    pub violations: ViolationSet,
    /// Reserved; always empty.
    pub suggestions: BTreeMap<String, Vec<String>>,
    pub breakdown: Breakdown,
    pub message: String,
    pub token_info: TokenInfo,
}

/// Receives coarse progress updates while a scan runs.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

/// Progress sink that writes to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, percent: u8, message: &str) {
        info!(percent, "{message}");
    }
}

/// Scans a parsed credit report for compliance violations.
#[async_trait]
pub trait ReportScanner: Send + Sync {
    async fn scan(&self, report: &Value) -> Result<ScanResponse, ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let config = ScanConfig::default();
        assert_eq!(config.max_input_tokens, 100_000);
        assert_eq!(config.max_item_tokens, 1_000);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.inquiry_lookback_months, 36);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: ScanConfig = serde_json::from_str(r#"{"batch_size": 2}"#).unwrap();
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.max_item_tokens, 1_000);
    }

    #[test]
    fn error_codes() {
        let err = ScanError::InputTooLarge {
            tokens: 10,
            limit: 5,
        };
        assert_eq!(err.code(), "INPUT_TOO_LARGE");
        assert!(err.to_string().starts_with("INPUT_TOO_LARGE"));
        assert_eq!(ScanError::QuotaExceeded("x".into()).code(), "QUOTA_EXCEEDED");
        let parse = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(ScanError::from(parse).code(), "AI_SCAN_FAILED");
    }

    #[test]
    fn token_info_uses_wire_names() {
        let value = serde_json::to_value(TokenInfo {
            items_analyzed_with_ai: 2,
            fallback_used: true,
            ..TokenInfo::default()
        })
        .unwrap();
        assert_eq!(value["itemsAnalyzedWithAI"], 2);
        assert_eq!(value["fallbackUsed"], true);
        assert_eq!(value["itemsSkippedByTokens"], 0);
    }
}
