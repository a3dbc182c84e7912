//! Structured feedback extraction from reflection turns.
//!
//! Agents usually answer the reflection prompt with JSON, often wrapped in a
//! markdown code fence. Anything that does not parse yields the empty bundle;
//! mining free-form prose is explicitly out of scope.

use serde::Deserialize;

use crate::invoke::TurnResult;

/// The four feedback lists a reflection turn is asked to produce. Missing
/// keys default to empty.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Reflection {
    #[serde(default)]
    pub process_steps: Vec<String>,
    #[serde(default)]
    pub what_worked: Vec<String>,
    #[serde(default)]
    pub what_didnt_work: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
}

/// Parse the reflection turn of a test, tolerating an absent turn, empty
/// text, fenced JSON, and unparseable prose.
pub fn parse_reflection(turn: Option<&TurnResult>) -> Reflection {
    let Some(turn) = turn else {
        return Reflection::default();
    };
    let text = turn.result.trim();
    if text.is_empty() {
        return Reflection::default();
    }
    let candidate = strip_code_fence(text);
    serde_json::from_str(candidate.trim()).unwrap_or_default()
}

/// Strip a single leading/trailing markdown code fence.
///
/// The opening line may carry an info string (```` ```json ````). The closing
/// fence is the nearest later line that is exactly ```` ``` ````; without one
/// the text is returned unmodified.
fn strip_code_fence(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    let mut lines = text.lines();
    let _opening = lines.next();
    let rest: Vec<&str> = lines.collect();
    let Some(close) = rest.iter().position(|line| line.trim() == "```") else {
        return text.to_string();
    };
    rest[..close].join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{TurnOutcome, TurnResult};

    fn reflection_turn(text: &str) -> TurnResult {
        TurnResult {
            outcome: TurnOutcome::Succeeded,
            result: text.to_string(),
            session_id: None,
            cost_usd: 0.0,
            num_turns: 1,
            error: None,
        }
    }

    const PAYLOAD: &str = r#"{
        "process_steps": ["read", "answer"],
        "what_worked": ["index"],
        "what_didnt_work": ["naming"],
        "improvement_suggestions": ["add examples"]
    }"#;

    #[test]
    fn fenced_and_unfenced_payloads_parse_identically() {
        let plain = parse_reflection(Some(&reflection_turn(PAYLOAD)));
        let fenced = parse_reflection(Some(&reflection_turn(&format!(
            "```json\n{PAYLOAD}\n```"
        ))));
        assert_eq!(plain, fenced);
        assert_eq!(plain.improvement_suggestions, vec!["add examples"]);
        assert_eq!(plain.process_steps, vec!["read", "answer"]);
    }

    #[test]
    fn bare_fence_marker_also_strips() {
        let fenced = parse_reflection(Some(&reflection_turn(&format!("```\n{PAYLOAD}\n```"))));
        assert_eq!(fenced.what_worked, vec!["index"]);
    }

    #[test]
    fn unterminated_fence_leaves_text_unmodified() {
        let parsed = parse_reflection(Some(&reflection_turn("```json\n{\"what_worked\": []}")));
        assert_eq!(parsed, Reflection::default());
    }

    #[test]
    fn prose_yields_empty_bundle() {
        let parsed = parse_reflection(Some(&reflection_turn(
            "I think the process went well overall.",
        )));
        assert_eq!(parsed, Reflection::default());
    }

    #[test]
    fn absent_turn_and_empty_text_yield_empty_bundle() {
        assert_eq!(parse_reflection(None), Reflection::default());
        assert_eq!(
            parse_reflection(Some(&reflection_turn("   "))),
            Reflection::default()
        );
    }

    #[test]
    fn missing_keys_default_to_empty_lists() {
        let parsed = parse_reflection(Some(&reflection_turn(
            r#"{"improvement_suggestions": ["one"]}"#,
        )));
        assert_eq!(parsed.improvement_suggestions, vec!["one"]);
        assert!(parsed.process_steps.is_empty());
        assert!(parsed.what_worked.is_empty());
    }

    #[test]
    fn non_object_payload_yields_empty_bundle() {
        let parsed = parse_reflection(Some(&reflection_turn(r#"["just", "a", "list"]"#)));
        assert_eq!(parsed, Reflection::default());
    }
}
