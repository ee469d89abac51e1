use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{
    aggregate::{
        offline_response, FallbackReason, ItemOutcome, ViolationAccumulator, ViolationSource,
    },
    budget::{check_payload, estimate_tokens, item_within_budget},
    extract::{extract_items, legacy_public_record_ids, ItemKind, ReportItem},
    violations::{parse_completion, static_violations},
    ProgressSink, ReportScanner, ScanConfig, ScanError, ScanResponse, TracingProgress,
};
use crate::llm::{CompletionRequest, LlmClient, LlmError};

const PROMPT_FORMAT: &str = "Return exactly 3 violations in this format:
- Metro 2 Violation: [specific violation]
- FCRA Violation: [specific violation]
- FDCPA Violation: [specific violation]";

/// Compliance scan pipeline: extraction, budget checks, batched analysis, aggregation.
pub struct ComplianceScanner {
    client: Option<Arc<dyn LlmClient>>,
    config: ScanConfig,
}

impl ComplianceScanner {
    /// `client == None` runs every scan in static mode.
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self::with_config(client, ScanConfig::default())
    }

    pub fn with_config(client: Option<Arc<dyn LlmClient>>, config: ScanConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    /// Run a scan with an explicit extraction date and progress sink.
    #[instrument(name = "compliance_scan", skip_all, fields(offline = self.client.is_none()))]
    pub async fn scan_with(
        &self,
        report: &Value,
        today: NaiveDate,
        progress: &dyn ProgressSink,
    ) -> Result<ScanResponse, ScanError> {
        progress.report(5, "Analyzing credit data structure...");
        let items = extract_items(report, today, self.config.inquiry_lookback_months);

        let input_tokens = check_payload(report, self.config.max_input_tokens).inspect_err(|err| {
            warn!(error = %err, "credit report rejected before analysis");
        })?;
        info!(input_tokens, items = items.len(), "credit report accepted");

        progress.report(10, "Validating API credentials...");
        let Some(client) = self.client.as_deref() else {
            info!("no completion client configured, returning static violations");
            progress.report(100, "Static analysis complete");
            return Ok(offline_response(input_tokens));
        };

        progress.report(15, "Extracting credit report items...");
        progress.report(
            20,
            &format!("Starting parallel analysis of {} items...", items.len()),
        );
        let mut accumulator = self.analyze(client, &items, progress).await?;

        progress.report(80, "Finalizing analysis...");
        accumulator.fill_static_public_records(legacy_public_record_ids(report));

        progress.report(90, "Finalizing analysis...");
        let response = accumulator.finish(input_tokens);
        info!(
            total_violations = response.total_violations,
            analyzed_with_ai = response.token_info.items_analyzed_with_ai,
            skipped_by_tokens = response.token_info.items_skipped_by_tokens,
            processed = response.token_info.total_items_processed,
            "compliance scan completed"
        );
        progress.report(100, "Analysis complete");
        Ok(response)
    }

    async fn analyze(
        &self,
        client: &dyn LlmClient,
        items: &[ReportItem],
        progress: &dyn ProgressSink,
    ) -> Result<ViolationAccumulator, ScanError> {
        let mut accumulator = ViolationAccumulator::new();
        let batch_size = self.config.batch_size.max(1);
        let batches = items.len().div_ceil(batch_size);

        for (number, batch) in items.chunks(batch_size).enumerate() {
            let done = number * batch_size;
            let percent = 30 + (done * 50 / items.len()) as u8;
            progress.report(
                percent,
                &format!(
                    "Processing batch {} of {} ({} items)...",
                    number + 1,
                    batches,
                    batch.len()
                ),
            );

            let outcomes = join_all(batch.iter().map(|item| self.analyze_item(client, item))).await;
            debug!(batch = number + 1, items = outcomes.len(), "batch complete");

            let quota_hit = outcomes.iter().any(|outcome| {
                outcome.source == ViolationSource::Fallback(FallbackReason::QuotaExceeded)
            });
            for outcome in outcomes {
                accumulator.record(outcome);
            }
            if quota_hit {
                warn!(batch = number + 1, "completion quota exhausted, aborting scan");
                return Err(ScanError::QuotaExceeded(format!(
                    "quota exhausted after {} of {} items",
                    accumulator.violations().len(),
                    items.len()
                )));
            }
        }
        Ok(accumulator)
    }

    async fn analyze_item(&self, client: &dyn LlmClient, item: &ReportItem) -> ItemOutcome {
        let summary = item.summary.to_json();
        let fallback = |reason| ItemOutcome {
            id: item.id.clone(),
            violations: static_violations(item.kind, item.index),
            source: ViolationSource::Fallback(reason),
        };

        if !item_within_budget(&summary, self.config.max_item_tokens) {
            warn!(
                id = %item.id,
                kind = item.kind.label(),
                tokens = estimate_tokens(&summary),
                limit = self.config.max_item_tokens,
                "item summary over token budget, using static violations"
            );
            return fallback(FallbackReason::OversizedItem);
        }

        let request = CompletionRequest {
            system: system_prompt(item.kind),
            user: format!(
                "Analyze this {} for compliance violations: {}",
                item.kind.label(),
                summary
            ),
            max_tokens: self.config.max_response_tokens,
            temperature: self.config.temperature,
        };

        match client.complete(&request).await {
            Ok(completion) => {
                let violations = parse_completion(&completion);
                if violations.is_empty() {
                    warn!(id = %item.id, "completion had no usable violation lines, using static violations");
                    return fallback(FallbackReason::UnusableResponse);
                }
                debug!(id = %item.id, count = violations.len(), "violations detected");
                ItemOutcome {
                    id: item.id.clone(),
                    violations,
                    source: ViolationSource::Model,
                }
            }
            Err(LlmError::QuotaExceeded(body)) => {
                warn!(id = %item.id, %body, "completion quota exhausted");
                fallback(FallbackReason::QuotaExceeded)
            }
            Err(err) => {
                warn!(id = %item.id, kind = item.kind.label(), error = %err, "analysis failed, using static violations");
                fallback(FallbackReason::RequestFailed)
            }
        }
    }
}

#[async_trait::async_trait]
impl ReportScanner for ComplianceScanner {
    async fn scan(&self, report: &Value) -> Result<ScanResponse, ScanError> {
        self.scan_with(report, Utc::now().date_naive(), &TracingProgress)
            .await
    }
}

fn system_prompt(kind: ItemKind) -> String {
    let subject = match kind {
        ItemKind::Account => "credit account",
        ItemKind::PublicRecord => "public record",
        ItemKind::Inquiry => "credit inquiry",
    };
    format!(
        "You are an expert credit compliance analyst. Analyze this {subject} for Metro 2, FCRA, and FDCPA violations. {PROMPT_FORMAT}"
    )
}
