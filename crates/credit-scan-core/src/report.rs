use std::fmt::Write;

use crate::scanner::{extract::ReportItem, ScanResponse};

/// Format styles supported by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Produce a report string from a `ScanResponse` using the desired format.
pub fn render_report(response: &ScanResponse, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(response),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(response)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(response)?),
    }
}

fn render_human(response: &ScanResponse) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "{}", response.message)?;
    writeln!(
        out,
        "Total violations: {} across {} item(s)",
        response.total_violations, response.affected_accounts
    )?;
    writeln!(
        out,
        "Breakdown: {} accounts • {} public records • {} inquiries",
        response.breakdown.accounts, response.breakdown.public_records, response.breakdown.inquiries
    )?;
    writeln!(out)?;

    if response.violations.is_empty() {
        writeln!(out, "No disputable items found.")?;
    } else {
        writeln!(out, "Violations:")?;
        for (id, lines) in &response.violations {
            writeln!(out, "  {id}")?;
            for line in lines {
                writeln!(out, "    - {}", single_line(line))?;
            }
        }
    }

    let info = &response.token_info;
    writeln!(out)?;
    writeln!(
        out,
        "Tokens: {} input • {} analyzed with AI • {} skipped by size • {} processed",
        info.input_tokens, info.items_analyzed_with_ai, info.items_skipped_by_tokens, info.total_items_processed
    )?;
    if info.fallback_used {
        writeln!(
            out,
            "Static fallback used for {} item(s)",
            info.items_using_fallback
        )?;
    }
    Ok(out)
}

/// Tabular listing of extracted items.
pub fn render_items(items: &[ReportItem], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(items)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(items)?),
        OutputFormat::Human => {
            let mut out = String::new();
            writeln!(out, "{} disputable item(s)", items.len())?;
            for item in items {
                writeln!(
                    out,
                    "- {id:<24} [{kind:13}] {summary}",
                    id = item.id,
                    kind = item.kind.label(),
                    summary = item.summary.to_json()
                )?;
            }
            Ok(out)
        }
    }
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::aggregate::offline_response;
    use crate::scanner::extract::extract_items;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn human_report_lists_violations() {
        let output = render_report(&offline_response(12), OutputFormat::Human).unwrap();
        assert!(output.contains("Using static violations"));
        assert!(output.contains("Total violations: 9 across 3 item(s)"));
        assert!(output.contains("  TRADE002"));
        assert!(output.contains("Static fallback used for 3 item(s)"));
    }

    #[test]
    fn json_report_uses_wire_names() {
        let output = render_report(&offline_response(0), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["totalViolations"], json!(9));
        assert_eq!(value["tokenInfo"]["fallbackUsed"], json!(true));
        assert!(value["suggestions"].as_object().unwrap().is_empty());
    }

    #[test]
    fn yaml_report_serializes() {
        let output = render_report(&offline_response(0), OutputFormat::Yaml).unwrap();
        assert!(output.contains("affectedAccounts: 3"));
    }

    #[test]
    fn items_listing() {
        let report = json!({
            "CREDIT_RESPONSE": {
                "CREDIT_LIABILITY": [{"@_DerogatoryDataIndicator": "Y", "_CREDITOR": {"@_Name": "ACME"}}]
            }
        });
        let items = extract_items(&report, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 36);
        let output = render_items(&items, OutputFormat::Human).unwrap();
        assert!(output.starts_with("1 disputable item(s)"));
        assert!(output.contains("TRADE001"));
        assert!(output.contains("\"creditor\":\"ACME\""));
    }
}
