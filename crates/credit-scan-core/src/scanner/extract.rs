//! Normalization of parsed bureau reports into typed, disputable items.
//!
//! Reports arrive as loosely-shaped JSON (XML converted to JSON, attribute keys
//! prefixed with `@`). Every lookup of an optional or alternate field name lives
//! in this module so the rest of the pipeline only sees [`ReportItem`]s.

use std::collections::HashSet;

use chrono::{Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

const RESPONSE_ROOT: &str = "CREDIT_RESPONSE";
const LIABILITY_SECTION: &str = "CREDIT_LIABILITY";
const PUBLIC_RECORD_SECTION: &str = "CREDIT_PUBLIC_RECORD";
const LEGACY_PUBLIC_RECORD_SECTION: &str = "PUBLIC_RECORD";
const INQUIRY_SECTION: &str = "CREDIT_INQUIRY";

const LATE_RATING_CODES: [&str; 8] = ["2", "3", "4", "5", "6", "7", "8", "9"];
const PUBLIC_RECORD_ACCOUNT_TYPES: [&str; 7] = ["13", "14", "15", "16", "93", "94", "95"];

const UNKNOWN: &str = "Unknown";

/// Leading decimal number of an amount once currency symbols and grouping
/// commas are removed.
static LEADING_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)").expect("amount regex is valid")
});

/// Source collection of a disputable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Account,
    PublicRecord,
    Inquiry,
}

impl ItemKind {
    /// Label used in prompts and logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::PublicRecord => "public_record",
            Self::Inquiry => "inquiry",
        }
    }

    /// Identifier tag used for positional fallback ids and collision prefixes.
    pub fn id_tag(self) -> &'static str {
        match self {
            Self::Account => "TRADE",
            Self::PublicRecord => "PUBLIC-RECORD",
            Self::Inquiry => "INQUIRY",
        }
    }

    fn positional_id(self, index: usize) -> String {
        match self {
            Self::Account => format!("TRADE{:03}", index + 1),
            Self::PublicRecord | Self::Inquiry => format!("{}-{:03}", self.id_tag(), index + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub creditor: String,
    pub status: String,
    /// Bureau value as sent: a JSON number stays a number.
    pub balance: Value,
    pub account_type: String,
    pub rating: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRecordSummary {
    #[serde(rename = "type")]
    pub record_type: String,
    pub status: String,
    pub amount: Value,
    pub date: String,
    pub court: String,
    pub case_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquirySummary {
    pub subscriber_name: String,
    pub date: String,
    #[serde(rename = "type")]
    pub inquiry_type: String,
    pub purpose: String,
}

/// Small projection of an item, the only part sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ItemSummary {
    Account(AccountSummary),
    PublicRecord(PublicRecordSummary),
    Inquiry(InquirySummary),
}

impl ItemSummary {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Account(_) => ItemKind::Account,
            Self::PublicRecord(_) => ItemKind::PublicRecord,
            Self::Inquiry(_) => ItemKind::Inquiry,
        }
    }

    /// Compact JSON used for both the per-item token estimate and the prompt.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A disputable entry extracted from the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportItem {
    pub id: String,
    pub kind: ItemKind,
    /// Position within the item's own collection.
    pub index: usize,
    pub summary: ItemSummary,
}

/// Extract every disputable item: negative accounts, public records, then
/// inquiries dated within `lookback_months` of `today`.
pub fn extract_items(report: &Value, today: NaiveDate, lookback_months: u32) -> Vec<ReportItem> {
    let liabilities = section(report, LIABILITY_SECTION);

    let accounts: Vec<(Option<String>, ItemSummary)> = liabilities
        .iter()
        .copied()
        .filter(|account| is_negative_account(account))
        .map(|account| (text(account, "@CreditLiabilityID"), account_summary(account)))
        .collect();

    let mut records: Vec<(Option<String>, ItemSummary)> = section(report, PUBLIC_RECORD_SECTION)
        .into_iter()
        .map(|record| (public_record_id(record), explicit_record_summary(record)))
        .collect();
    records.extend(
        liabilities
            .iter()
            .copied()
            .filter(|account| {
                text(account, "@_AccountType")
                    .is_some_and(|code| PUBLIC_RECORD_ACCOUNT_TYPES.contains(&code.as_str()))
            })
            .map(|account| (public_record_id(account), synthetic_record_summary(account))),
    );

    let cutoff = inquiry_cutoff(today, lookback_months);
    let inquiries: Vec<(Option<String>, ItemSummary)> = section(report, INQUIRY_SECTION)
        .into_iter()
        .filter(|inquiry| is_recent_inquiry(inquiry, cutoff))
        .map(|inquiry| (text(inquiry, "@_InquiryIdentifier"), inquiry_summary(inquiry)))
        .collect();

    debug!(
        accounts = accounts.len(),
        public_records = records.len(),
        inquiries = inquiries.len(),
        %cutoff,
        "extracted disputable items"
    );

    let mut ids = IdAllocator::default();
    let mut items = Vec::with_capacity(accounts.len() + records.len() + inquiries.len());
    for collection in [accounts, records, inquiries] {
        for (index, (bureau_id, summary)) in collection.into_iter().enumerate() {
            items.push(ids.item(bureau_id, index, summary));
        }
    }
    items
}

/// Identifiers of entries in the legacy `PUBLIC_RECORD` section, which only
/// ever receive static violations.
pub fn legacy_public_record_ids(report: &Value) -> Vec<String> {
    section(report, LEGACY_PUBLIC_RECORD_SECTION)
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            text(record, "@_AccountIdentifier")
                .unwrap_or_else(|| ItemKind::PublicRecord.positional_id(index))
        })
        .collect()
}

/// Earliest inquiry date still considered recent. Month arithmetic clamps to
/// the last day of shorter months.
pub fn inquiry_cutoff(today: NaiveDate, lookback_months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(lookback_months))
        .unwrap_or(NaiveDate::MIN)
}

#[derive(Default)]
struct IdAllocator {
    seen: HashSet<String>,
}

impl IdAllocator {
    fn item(&mut self, bureau_id: Option<String>, index: usize, summary: ItemSummary) -> ReportItem {
        let kind = summary.kind();
        let base = bureau_id.unwrap_or_else(|| kind.positional_id(index));
        let id = self.unique(base, kind);
        ReportItem {
            id,
            kind,
            index,
            summary,
        }
    }

    fn unique(&mut self, base: String, kind: ItemKind) -> String {
        if self.seen.insert(base.clone()) {
            return base;
        }
        let tagged = format!("{}-{base}", kind.id_tag());
        if self.seen.insert(tagged.clone()) {
            trace!(%base, id = %tagged, "disambiguated repeated bureau identifier");
            return tagged;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{tagged}-{n}");
            if self.seen.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn section<'a>(report: &'a Value, name: &str) -> Vec<&'a Value> {
    match report.get(RESPONSE_ROOT).and_then(|root| root.get(name)) {
        Some(Value::Array(entries)) => entries.iter().filter(|v| v.is_object()).collect(),
        Some(entry) if entry.is_object() => vec![entry],
        _ => Vec::new(),
    }
}

/// Read a scalar attribute as text. Blank strings count as missing.
fn text(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Like [`text`], but numbers stay JSON numbers.
fn scalar(node: &Value, key: &str) -> Option<Value> {
    match node.get(key)? {
        Value::Number(n) => Some(Value::Number(n.clone())),
        _ => text(node, key).map(Value::String),
    }
}

fn scalar_or(node: &Value, keys: &[&str], default: &str) -> Value {
    keys.iter()
        .find_map(|key| scalar(node, key))
        .unwrap_or_else(|| Value::String(default.to_string()))
}

/// Numeric value of an amount such as `"1,250.00"`, `"$245"` or `"80 USD"`.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    LEADING_AMOUNT.find(&cleaned)?.as_str().parse().ok()
}

fn text_or(node: &Value, keys: &[&str], default: &str) -> String {
    keys.iter()
        .find_map(|key| text(node, key))
        .unwrap_or_else(|| default.to_string())
}

fn is_flagged(node: &Value, key: &str) -> bool {
    text(node, key).is_some_and(|v| v == "Y")
}

fn is_negative_account(account: &Value) -> bool {
    let past_due = text(account, "@_PastDueAmount")
        .and_then(|amount| parse_amount(&amount))
        .is_some_and(|amount| amount > 0.0);
    let late_rating = account
        .get("_CURRENT_RATING")
        .and_then(|rating| text(rating, "@_Code"))
        .is_some_and(|code| LATE_RATING_CODES.contains(&code.as_str()));

    is_flagged(account, "@_DerogatoryDataIndicator")
        || is_flagged(account, "@IsCollectionIndicator")
        || is_flagged(account, "@IsChargeoffIndicator")
        || past_due
        || late_rating
        || text(account, "@_ChargeOffDate").is_some()
}

fn account_summary(account: &Value) -> ItemSummary {
    let creditor = account
        .get("_CREDITOR")
        .and_then(|creditor| text(creditor, "@_Name"))
        .unwrap_or_else(|| UNKNOWN.to_string());
    ItemSummary::Account(AccountSummary {
        creditor,
        status: text_or(account, &["@_AccountStatusType"], UNKNOWN),
        balance: scalar_or(account, &["@_CurrentBalance"], "0"),
        account_type: text_or(account, &["@_AccountType"], UNKNOWN),
        rating: text_or(account, &["@_AccountCurrentRatingCode"], UNKNOWN),
    })
}

fn public_record_id(node: &Value) -> Option<String> {
    text(node, "@CreditLiabilityID").or_else(|| text(node, "@_SubscriberCode"))
}

fn explicit_record_summary(record: &Value) -> ItemSummary {
    ItemSummary::PublicRecord(PublicRecordSummary {
        record_type: text_or(
            record,
            &["@publicRecordType", "@_Type", "@_AccountType"],
            "PUBLIC RECORD",
        ),
        status: text_or(record, &["status", "@_DispositionType", "@_AccountStatusType"], UNKNOWN),
        amount: scalar_or(record, &["@_CurrentBalance", "@_Amount", "@_LegalObligationAmount"], "0"),
        date: text_or(record, &["filingDate", "@_FiledDate", "@_AccountOpenedDate"], UNKNOWN),
        court: text_or(record, &["@courtName", "@_CourtName", "@_SubscriberName"], UNKNOWN),
        case_number: text_or(record, &["caseNumber", "@_DocketIdentifier", "@_AccountNumber"], UNKNOWN),
    })
}

fn synthetic_record_summary(account: &Value) -> ItemSummary {
    let record_type = match text(account, "@_AccountType").as_deref() {
        Some("93") => "BANKRUPTCY",
        Some("94") => "TAX LIEN",
        Some("95") => "JUDGMENT",
        _ => "PUBLIC RECORD",
    };
    ItemSummary::PublicRecord(PublicRecordSummary {
        record_type: record_type.to_string(),
        status: text_or(account, &["@_AccountStatusType"], "Status Not Available"),
        amount: scalar_or(account, &["@_CurrentBalance", "@_Amount"], "0"),
        date: text_or(account, &["@_AccountOpenedDate"], "Filing Date Not Available"),
        court: text_or(account, &["@_SubscriberName"], "Court Name Not Available"),
        case_number: text_or(account, &["@_AccountNumber"], "Case Number Not Available"),
    })
}

fn inquiry_date(inquiry: &Value) -> Option<NaiveDate> {
    let raw = text(inquiry, "_DateOfInquiry").or_else(|| text(inquiry, "@_Date"))?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok()
}

fn is_recent_inquiry(inquiry: &Value, cutoff: NaiveDate) -> bool {
    match inquiry_date(inquiry) {
        Some(date) => {
            let recent = date >= cutoff;
            trace!(%date, %cutoff, recent, "inquiry date check");
            recent
        }
        None => {
            trace!("inquiry skipped: no usable date field");
            false
        }
    }
}

fn inquiry_summary(inquiry: &Value) -> ItemSummary {
    ItemSummary::Inquiry(InquirySummary {
        subscriber_name: text_or(inquiry, &["@_SubscriberName"], UNKNOWN),
        date: text_or(inquiry, &["@_Date", "_DateOfInquiry"], UNKNOWN),
        inquiry_type: text_or(inquiry, &["@_Type"], UNKNOWN),
        purpose: text_or(inquiry, &["@_InquiryPurposeType"], UNKNOWN),
    })
}
