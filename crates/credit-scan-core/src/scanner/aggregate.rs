use std::collections::BTreeMap;

use super::{
    extract::ItemKind, violations::static_violations, Breakdown, ScanResponse, TokenInfo,
    ViolationSet,
};

/// How an item's violations were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationSource {
    Model,
    Fallback(FallbackReason),
}

/// Why an item fell back to static violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Summary exceeded the per-item token ceiling; no call was made.
    OversizedItem,
    RequestFailed,
    QuotaExceeded,
    /// Empty completion, or nothing in it looked like a violation line.
    UnusableResponse,
}

/// Result of analyzing one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub id: String,
    pub violations: Vec<String>,
    pub source: ViolationSource,
}

/// Per-scan accumulator. Built fresh for every request.
#[derive(Debug, Default)]
pub struct ViolationAccumulator {
    violations: ViolationSet,
    analyzed_with_model: usize,
    skipped_by_tokens: usize,
    using_fallback: usize,
    processed: usize,
}

impl ViolationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        self.processed += 1;
        match outcome.source {
            ViolationSource::Model => self.analyzed_with_model += 1,
            ViolationSource::Fallback(reason) => {
                self.using_fallback += 1;
                if reason == FallbackReason::OversizedItem {
                    self.skipped_by_tokens += 1;
                }
            }
        }
        self.violations.insert(outcome.id, outcome.violations);
    }

    /// Give static public-record violations to ids not already present.
    /// These are not counted as processed items.
    pub fn fill_static_public_records(&mut self, ids: impl IntoIterator<Item = String>) {
        for (index, id) in ids.into_iter().enumerate() {
            self.violations
                .entry(id)
                .or_insert_with(|| static_violations(ItemKind::PublicRecord, index));
        }
    }

    pub fn violations(&self) -> &ViolationSet {
        &self.violations
    }

    /// Assemble the response for a scan that went through the model.
    pub fn finish(self, input_tokens: usize) -> ScanResponse {
        let breakdown = breakdown(&self.violations);
        let message = format!(
            "AI analysis completed: Found violations across {} accounts, {} public records, and {} inquiries",
            breakdown.accounts, breakdown.public_records, breakdown.inquiries
        );
        let token_info = TokenInfo {
            input_tokens,
            items_analyzed_with_ai: self.analyzed_with_model,
            items_skipped_by_tokens: self.skipped_by_tokens,
            total_items_processed: self.processed,
            items_using_fallback: self.using_fallback,
            fallback_used: self.using_fallback > 0,
        };
        response(self.violations, breakdown, message, token_info)
    }
}

/// Placeholder ids used when no completion service is configured.
pub const OFFLINE_PLACEHOLDER_IDS: [&str; 3] = ["TRADE001", "TRADE002", "TRADE003"];

/// Static-only response for offline mode.
pub fn offline_response(input_tokens: usize) -> ScanResponse {
    let violations: ViolationSet = OFFLINE_PLACEHOLDER_IDS
        .iter()
        .enumerate()
        .map(|(index, id)| (id.to_string(), static_violations(ItemKind::Account, index)))
        .collect();
    let breakdown = breakdown(&violations);
    let token_info = TokenInfo {
        input_tokens,
        items_analyzed_with_ai: 0,
        items_skipped_by_tokens: 0,
        total_items_processed: violations.len(),
        items_using_fallback: violations.len(),
        fallback_used: true,
    };
    response(
        violations,
        breakdown,
        "Using static violations (no AI key available)".to_string(),
        token_info,
    )
}

/// Count keys per category from identifier patterns (ASCII case-insensitive).
pub fn breakdown(violations: &ViolationSet) -> Breakdown {
    let mut breakdown = Breakdown::default();
    for id in violations.keys() {
        let upper = id.to_ascii_uppercase();
        if upper.starts_with("TRADE") {
            breakdown.accounts += 1;
        }
        if upper.contains("PUBLIC-RECORD") {
            breakdown.public_records += 1;
        }
        if upper.contains("INQUIRY") {
            breakdown.inquiries += 1;
        }
    }
    breakdown
}

fn response(
    violations: ViolationSet,
    breakdown: Breakdown,
    message: String,
    token_info: TokenInfo,
) -> ScanResponse {
    ScanResponse {
        success: true,
        total_violations: violations.values().map(Vec::len).sum(),
        affected_accounts: violations.values().filter(|v| !v.is_empty()).count(),
        violations,
        suggestions: BTreeMap::new(),
        breakdown,
        message,
        token_info,
    }
}
