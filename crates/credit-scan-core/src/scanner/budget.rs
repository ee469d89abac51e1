use serde_json::Value;

use super::ScanError;

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximate token count of `text`: one token per four characters, rounded up.
///
/// This is a heuristic, not a tokenizer. For English prose it is usually within
/// ±25% of a BPE tokenizer; dense JSON with short keys and digits tends to be
/// undercounted. The configured ceilings are expressed in these estimated
/// tokens, so switching to an exact tokenizer means re-deriving them.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Whole-request guard over the compact JSON form of the full payload.
///
/// Returns the estimated token count when it is within `limit` (inclusive).
pub fn check_payload(report: &Value, limit: usize) -> Result<usize, ScanError> {
    let tokens = estimate_tokens(&report.to_string());
    if tokens > limit {
        return Err(ScanError::InputTooLarge { tokens, limit });
    }
    Ok(tokens)
}

/// Per-item guard over an item's serialized summary.
pub fn item_within_budget(summary_json: &str, limit: usize) -> bool {
    estimate_tokens(summary_json) <= limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn rounds_partial_tokens_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn payload_at_ceiling_is_accepted() {
        // `"` + 398 chars + `"` serializes to exactly 400 chars = 100 tokens.
        let report = Value::String("x".repeat(398));
        assert_eq!(check_payload(&report, 100).unwrap(), 100);
    }

    #[test]
    fn payload_one_token_over_is_rejected() {
        let report = Value::String("x".repeat(399));
        let err = check_payload(&report, 100).expect_err("101 tokens must be rejected");
        assert!(matches!(
            err,
            ScanError::InputTooLarge { tokens: 101, limit: 100 }
        ));
    }

    #[test]
    fn payload_is_measured_in_compact_form() {
        let report = json!({"a": 1});
        // {"a":1} is 7 chars.
        assert_eq!(check_payload(&report, 10).unwrap(), 2);
    }

    #[test]
    fn item_guard_is_inclusive() {
        let summary = "y".repeat(40);
        assert!(item_within_budget(&summary, 10));
        assert!(!item_within_budget(&format!("{summary}z"), 10));
    }

    proptest! {
        #[test]
        fn estimate_brackets_char_count(text in ".{0,256}") {
            let chars = text.chars().count();
            let tokens = estimate_tokens(&text);
            prop_assert!(tokens * CHARS_PER_TOKEN >= chars);
            prop_assert!(tokens * CHARS_PER_TOKEN < chars + CHARS_PER_TOKEN);
        }
    }
}
