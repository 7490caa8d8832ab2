//! Intent parser
//!
//! Turns a raw oracle reply into either conversational text or a candidate
//! transaction. A reply that does not parse as a structured directive is
//! prose; parse failure never surfaces as an error.

use crate::models::{CandidateAction, TransactionType, CREATE_TRANSACTION_ACTION, DEFAULT_CATEGORY};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Plain text to display and speak verbatim
    Conversational(String),
    /// Unvalidated transaction proposal
    Action(CandidateAction),
}

/// Classify a raw oracle reply.
pub fn parse_reply(raw: &str) -> Intent {
    let cleaned = strip_code_fences(raw);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Oracle reply is not structured, treating as conversation");
            return Intent::Conversational(raw.to_string());
        }
    };

    match candidate_from_directive(&value) {
        Some(candidate) => Intent::Action(candidate),
        None => {
            debug!("Structured reply without a transaction directive, treating as conversation");
            Intent::Conversational(raw.to_string())
        }
    }
}

/// Remove a surrounding ``` / ```json fence the model may add despite instructions.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop an info string such as "json" on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) if rest[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[newline + 1..]
        }
        _ => rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest),
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Extract a normalised candidate from a parsed directive.
///
/// Returns `None` unless the value is an object whose `action` equals
/// `create_transaction`. Field validity (amount sign, magnitude) is left to
/// the applicator; only the type defaults to EXPENSE here.
pub fn candidate_from_directive(value: &Value) -> Option<CandidateAction> {
    let object = value.as_object()?;

    if object.get("action").and_then(Value::as_str) != Some(CREATE_TRANSACTION_ACTION) {
        return None;
    }

    let category = non_empty_str(object.get("category"))
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();

    let description = non_empty_str(object.get("description"))
        .map(str::to_string)
        .unwrap_or_else(|| category.clone());

    let transaction_type = TransactionType::normalize(object.get("type").and_then(Value::as_str));

    Some(CandidateAction {
        amount: object.get("amount").and_then(coerce_amount),
        category,
        transaction_type: transaction_type.as_str().to_string(),
        description,
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Numbers pass through; numeric strings (optionally with thousands separators) are parsed.
fn coerce_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_action(raw: &str) -> CandidateAction {
        match parse_reply(raw) {
            Intent::Action(candidate) => candidate,
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_directive_with_string_amount() {
        let candidate = expect_action(
            r#"{"action":"create_transaction","amount":"45","category":"Food","type":"expense","description":"lunch"}"#,
        );

        assert_eq!(candidate.amount, Some(45.0));
        assert_eq!(candidate.category, "Food");
        assert_eq!(candidate.transaction_type, "EXPENSE");
        assert_eq!(candidate.description, "lunch");
    }

    #[test]
    fn test_income_is_case_insensitive() {
        let candidate = expect_action(
            r#"{"action":"create_transaction","amount":50000,"category":"Salary","type":"Income"}"#,
        );
        assert_eq!(candidate.transaction_type, "INCOME");
        assert_eq!(candidate.amount, Some(50000.0));
    }

    #[test]
    fn test_missing_type_and_description_defaults() {
        let candidate =
            expect_action(r#"{"action":"create_transaction","amount":12.5,"category":"Travel"}"#);

        assert_eq!(candidate.transaction_type, "EXPENSE");
        assert_eq!(candidate.description, "Travel");
    }

    #[test]
    fn test_missing_category_defaults_to_uncategorized() {
        let candidate = expect_action(r#"{"action":"create_transaction","amount":3}"#);
        assert_eq!(candidate.category, "Uncategorized");
        assert_eq!(candidate.description, "Uncategorized");
    }

    #[test]
    fn test_unknown_type_maps_to_expense() {
        let candidate =
            expect_action(r#"{"action":"create_transaction","amount":3,"type":"refund"}"#);
        assert_eq!(candidate.transaction_type, "EXPENSE");
    }

    #[test]
    fn test_non_numeric_amount_is_carried_as_missing() {
        let candidate =
            expect_action(r#"{"action":"create_transaction","amount":"a lot","category":"Food"}"#);
        assert_eq!(candidate.amount, None);

        let candidate = expect_action(r#"{"action":"create_transaction","category":"Food"}"#);
        assert_eq!(candidate.amount, None);
    }

    #[test]
    fn test_thousands_separator_amount() {
        let candidate = expect_action(r#"{"action":"create_transaction","amount":"1,250.75"}"#);
        assert_eq!(candidate.amount, Some(1250.75));
    }

    #[test]
    fn test_fenced_directive() {
        let raw = "```json\n{\"action\":\"create_transaction\",\"amount\":20,\"category\":\"Food\"}\n```";
        let candidate = expect_action(raw);
        assert_eq!(candidate.amount, Some(20.0));

        let inline = "```json{\"action\":\"create_transaction\",\"amount\":7}```";
        assert_eq!(expect_action(inline).amount, Some(7.0));

        let bare = "```\n{\"action\":\"create_transaction\",\"amount\":8}\n```";
        assert_eq!(expect_action(bare).amount, Some(8.0));
    }

    #[test]
    fn test_prose_passes_through_verbatim() {
        let raw = "You are eligible for a ₹5 Lakh home loan.";
        assert_eq!(parse_reply(raw), Intent::Conversational(raw.to_string()));
    }

    #[test]
    fn test_malformed_json_is_conversation() {
        let raw = r#"{"action":"create_transaction","amount":45"#;
        assert_eq!(parse_reply(raw), Intent::Conversational(raw.to_string()));
    }

    #[test]
    fn test_discriminator_mismatch_is_conversation() {
        for raw in [
            r#"{"action":"delete_transaction","amount":45}"#,
            r#"{"amount":45,"category":"Food"}"#,
            r#"["create_transaction"]"#,
            "42",
            r#""create_transaction""#,
        ] {
            assert_eq!(parse_reply(raw), Intent::Conversational(raw.to_string()));
        }
    }

    #[test]
    fn test_strip_code_fences_leaves_plain_text() {
        assert_eq!(strip_code_fences("  hello  "), "hello");
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
    }
}
