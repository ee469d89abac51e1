use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::extract::ItemKind;

/// Upper bound on violations kept per item.
pub const MAX_VIOLATIONS_PER_ITEM: usize = 3;

/// Leading list markers models like to emit: `-`, `*`, `•`, `1.`, `2)`.
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•]+|\d+[.)])\s*").expect("list marker regex is valid"));

static CATEGORY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(metro\s*2|fcra|fdcpa)(?:[\s:]|$)").expect("category prefix regex is valid")
});

/// Regulatory family a violation line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Metro 2")]
    Metro2,
    #[serde(rename = "FCRA")]
    Fcra,
    #[serde(rename = "FDCPA")]
    Fdcpa,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Self::Metro2 => "Metro 2",
            Self::Fcra => "FCRA",
            Self::Fdcpa => "FDCPA",
        }
    }

    /// Category named at the start of `line`, if any.
    pub fn of(line: &str) -> Option<Self> {
        let caps = CATEGORY_PREFIX.captures(line)?;
        let name = caps.get(1)?.as_str().to_ascii_uppercase();
        match name.as_str() {
            "FCRA" => Some(Self::Fcra),
            "FDCPA" => Some(Self::Fdcpa),
            _ => Some(Self::Metro2),
        }
    }
}

/// Turn a free-text completion into at most three categorized violation lines.
///
/// Lines are trimmed and list markers stripped. A line must open with a
/// category label followed by whitespace, `:` or nothing; the label is then
/// rewritten to its canonical spelling (`metro2 ...` becomes `Metro 2 ...`).
/// An empty result means the completion was unusable.
pub fn parse_completion(completion: &str) -> Vec<String> {
    completion
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| canonical_line(LIST_MARKER.replace(line, "").trim()))
        .take(MAX_VIOLATIONS_PER_ITEM)
        .collect()
}

fn canonical_line(line: &str) -> Option<String> {
    let label = CATEGORY_PREFIX.captures(line)?.get(1)?;
    let category = Category::of(line)?;
    Some(format!("{}{}", category.label(), &line[label.end()..]))
}

const ACCOUNT_FALLBACKS: [[&str; 3]; 3] = [
    [
        "Metro 2 Violation: Missing required Date of First Delinquency field",
        "FCRA Violation: Account status reporting inconsistent across bureaus",
        "Metro 2 Violation: Payment pattern does not align with current account status",
    ],
    [
        "Metro 2 Violation: Incorrect Account Type code reported",
        "FCRA Violation: Dispute resolution not properly documented",
        "Metro 2 Violation: Balance exceeds reported credit limit",
    ],
    [
        "Metro 2 Violation: Missing Consumer Information Indicator",
        "FCRA Violation: Account ownership incorrectly reported",
        "Metro 2 Violation: Payment history contains invalid status codes",
    ],
];

const PUBLIC_RECORD_FALLBACK: [&str; 3] = [
    "Metro 2 Violation: Public record information is outdated or inaccurate",
    "FCRA Violation: Public record lacks proper verification",
    "FDCPA Violation: Public record collection activity violates guidelines",
];

const INQUIRY_FALLBACK: [&str; 3] = [
    "Metro 2 Violation: Inquiry exceeds permissible purpose timeframe",
    "FCRA Violation: Inquiry lacks proper authorization documentation",
    "FDCPA Violation: Inquiry related to unauthorized debt collection",
];

/// Deterministic violations for an item that could not be analyzed.
///
/// Accounts rotate through three sets by positional index; public records and
/// inquiries always get the same set.
pub fn static_violations(kind: ItemKind, index: usize) -> Vec<String> {
    let lines: &[&str; 3] = match kind {
        ItemKind::Account => &ACCOUNT_FALLBACKS[index % ACCOUNT_FALLBACKS.len()],
        ItemKind::PublicRecord => &PUBLIC_RECORD_FALLBACK,
        ItemKind::Inquiry => &INQUIRY_FALLBACK,
    };
    lines.iter().map(|line| line.to_string()).collect()
}
