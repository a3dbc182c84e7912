//! One bounded request/response exchange with the `claude` CLI.
//!
//! The CLI prints a single JSON envelope on stdout, but its field names have
//! drifted across releases. Every logical value is therefore resolved through
//! a fixed priority list of candidate keys (see the `*_KEYS` constants);
//! first present, non-null key wins. Invocation faults never propagate:
//! every path out of [`Invoke::invoke`] is a [`TurnResult`].

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::depth::DEPTH_ENV_VAR;
use crate::process::{self, Captured};

/// Byte cap per captured stream. An envelope beyond this fails JSON parsing
/// and surfaces through the unparseable-stdout path.
const OUTPUT_LIMIT_BYTES: usize = 4_000_000;

/// Candidate envelope keys per logical field, in priority order.
const TEXT_KEYS: &[&str] = &["result", "message"];
const SESSION_KEYS: &[&str] = &["session_id", "sessionId"];
const COST_KEYS: &[&str] = &["total_cost_usd", "cost_usd", "costUsd"];
const TURN_KEYS: &[&str] = &["num_turns", "numTurns"];

/// How one turn ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Succeeded,
    Failed,
    /// Transport-level success, but the agent ran out of turns mid-task.
    Incomplete,
}

/// Normalized result of one conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    /// Response text. Preserved verbatim from raw stdout when the envelope
    /// was unparseable, for diagnostics.
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub cost_usd: f64,
    pub num_turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TurnResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Succeeded)
    }

    fn fault(error: String) -> Self {
        Self {
            outcome: TurnOutcome::Failed,
            result: String::new(),
            session_id: None,
            cost_usd: 0.0,
            num_turns: 0,
            error: Some(error),
        }
    }
}

/// Parameters for one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub prompt: String,
    /// Working directory for the agent process.
    pub agent_dir: PathBuf,
    /// Continue this session instead of starting a fresh conversation.
    pub session_id: Option<String>,
    pub max_turns: u32,
    pub allowed_tools: Option<String>,
    pub permission_mode: Option<String>,
    pub timeout: Option<Duration>,
    /// Recursion depth of this harness process; the child sees `depth + 1`.
    pub depth: u32,
}

/// Seam between the test runner and the agent backend. Tests use scripted
/// invokers that return predetermined results without spawning processes.
pub trait Invoke {
    fn invoke(&self, request: &TurnRequest) -> TurnResult;
}

/// Invoker that shells out to the `claude` CLI. One call per turn, no retries.
pub struct ClaudeInvoker;

impl Invoke for ClaudeInvoker {
    #[instrument(skip_all, fields(max_turns = request.max_turns, resumed = request.session_id.is_some()))]
    fn invoke(&self, request: &TurnRequest) -> TurnResult {
        let cmd = build_command(request);
        let captured = match process::run_with_timeout(cmd, request.timeout, OUTPUT_LIMIT_BYTES) {
            Ok(captured) => captured,
            Err(err) => return spawn_fault(&err),
        };

        if captured.timed_out {
            // Partial output from a killed child is not trustworthy; drop it.
            let secs = request.timeout.map(|t| t.as_secs()).unwrap_or_default();
            warn!(timeout_secs = secs, "agent call timed out");
            return TurnResult::fault(format!("Test timed out after {secs} seconds"));
        }

        normalize_response(&captured)
    }
}

fn build_command(request: &TurnRequest) -> Command {
    let mut cmd = Command::new("claude");
    cmd.arg("-p")
        .arg(&request.prompt)
        .arg("--output-format")
        .arg("json");
    if let Some(session) = &request.session_id {
        cmd.arg("--resume").arg(session);
    }
    if let Some(tools) = &request.allowed_tools {
        cmd.arg("--allowedTools").arg(tools);
    }
    if let Some(mode) = &request.permission_mode {
        cmd.arg("--permission-mode").arg(mode);
    }
    cmd.arg("--max-turns").arg(request.max_turns.to_string());
    cmd.current_dir(&request.agent_dir);
    cmd.env(DEPTH_ENV_VAR, (request.depth + 1).to_string());
    cmd
}

fn spawn_fault(err: &anyhow::Error) -> TurnResult {
    let not_found = err
        .root_cause()
        .downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound);
    if not_found {
        TurnResult::fault("claude CLI not found. Is it installed and in PATH?".to_string())
    } else {
        TurnResult::fault(format!("{err:#}"))
    }
}

/// Map a captured CLI exchange onto a [`TurnResult`].
fn normalize_response(captured: &Captured) -> TurnResult {
    let stdout = String::from_utf8_lossy(&captured.stdout);
    let envelope: Value = match serde_json::from_str(stdout.trim()) {
        Ok(value) => value,
        Err(err) => {
            debug!(%err, "agent stdout was not valid JSON");
            let stderr = String::from_utf8_lossy(&captured.stderr);
            return TurnResult {
                outcome: TurnOutcome::Failed,
                result: stdout.into_owned(),
                session_id: None,
                cost_usd: 0.0,
                num_turns: 0,
                error: Some(format!("Failed to parse JSON output: {}", stderr.trim())),
            };
        }
    };

    let subtype = envelope
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or("success");
    let mut result = first_text(&envelope, TEXT_KEYS);
    let session_id = first_string(&envelope, SESSION_KEYS);
    let cost_usd = first_f64(&envelope, COST_KEYS).unwrap_or(0.0);
    let num_turns = first_u32(&envelope, TURN_KEYS).unwrap_or(1);

    // The CLI exits 0 on turn-limit exhaustion; task-level it is a failure.
    if subtype == "error_max_turns" {
        if result.is_empty() {
            result = "[Task incomplete - max turns reached]".to_string();
        }
        return TurnResult {
            outcome: TurnOutcome::Incomplete,
            result,
            session_id,
            cost_usd,
            num_turns,
            error: Some(format!(
                "Task did not complete within {num_turns} turns (max_turns limit reached)"
            )),
        };
    }

    let exit_ok = captured.status.success();
    let outcome = if exit_ok && subtype == "success" {
        TurnOutcome::Succeeded
    } else {
        TurnOutcome::Failed
    };
    let error = if exit_ok {
        None
    } else {
        Some(
            String::from_utf8_lossy(&captured.stderr)
                .trim()
                .to_string(),
        )
    };

    TurnResult {
        outcome,
        result,
        session_id,
        cost_usd,
        num_turns,
        error,
    }
}

fn first_value<'a>(envelope: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| envelope.get(*key))
        .find(|value| !value.is_null())
}

/// A structured (non-string) response text is serialized back to its JSON
/// text rather than rejected.
fn first_text(envelope: &Value, keys: &[&str]) -> String {
    match first_value(envelope, keys) {
        None => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn first_string(envelope: &Value, keys: &[&str]) -> Option<String> {
    first_value(envelope, keys)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn first_f64(envelope: &Value, keys: &[&str]) -> Option<f64> {
    first_value(envelope, keys).and_then(Value::as_f64)
}

fn first_u32(envelope: &Value, keys: &[&str]) -> Option<u32> {
    first_value(envelope, keys)
        .and_then(Value::as_u64)
        .map(|n| n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn captured(exit_code: i32, stdout: &str, stderr: &str) -> Captured {
        Captured {
            status: ExitStatus::from_raw(exit_code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            timed_out: false,
        }
    }

    #[test]
    fn normalizes_successful_envelope() {
        let stdout = r#"{
            "subtype": "success",
            "result": "done",
            "session_id": "sess-1",
            "total_cost_usd": 0.05,
            "num_turns": 3
        }"#;
        let turn = normalize_response(&captured(0, stdout, ""));
        assert_eq!(turn.outcome, TurnOutcome::Succeeded);
        assert_eq!(turn.result, "done");
        assert_eq!(turn.session_id.as_deref(), Some("sess-1"));
        assert_eq!(turn.cost_usd, 0.05);
        assert_eq!(turn.num_turns, 3);
        assert_eq!(turn.error, None);
    }

    #[test]
    fn tolerates_variant_key_names() {
        let stdout = r#"{
            "message": "done",
            "sessionId": "sess-2",
            "costUsd": 0.01,
            "numTurns": 2
        }"#;
        let turn = normalize_response(&captured(0, stdout, ""));
        assert_eq!(turn.result, "done");
        assert_eq!(turn.session_id.as_deref(), Some("sess-2"));
        assert_eq!(turn.cost_usd, 0.01);
        assert_eq!(turn.num_turns, 2);
    }

    #[test]
    fn prefers_earlier_candidate_keys() {
        let stdout = r#"{"total_cost_usd": 0.2, "cost_usd": 0.9, "result": "x"}"#;
        let turn = normalize_response(&captured(0, stdout, ""));
        assert_eq!(turn.cost_usd, 0.2);
    }

    #[test]
    fn serializes_structured_response_text() {
        let stdout = r#"{"result": {"answer": 42}, "session_id": "s"}"#;
        let turn = normalize_response(&captured(0, stdout, ""));
        assert_eq!(turn.result, r#"{"answer":42}"#);
    }

    #[test]
    fn turn_limit_is_incomplete_with_placeholder_text() {
        let stdout = r#"{"subtype": "error_max_turns", "session_id": "s", "num_turns": 10}"#;
        let turn = normalize_response(&captured(0, stdout, ""));
        assert_eq!(turn.outcome, TurnOutcome::Incomplete);
        assert_eq!(turn.result, "[Task incomplete - max turns reached]");
        let error = turn.error.expect("synthesized error");
        assert!(error.contains("10 turns"));
    }

    #[test]
    fn turn_limit_keeps_partial_response_text() {
        let stdout = r#"{"subtype": "error_max_turns", "result": "partial", "num_turns": 4}"#;
        let turn = normalize_response(&captured(0, stdout, ""));
        assert_eq!(turn.outcome, TurnOutcome::Incomplete);
        assert_eq!(turn.result, "partial");
    }

    #[test]
    fn unparseable_stdout_preserves_raw_output() {
        let turn = normalize_response(&captured(0, "not json at all", "boom"));
        assert_eq!(turn.outcome, TurnOutcome::Failed);
        assert_eq!(turn.result, "not json at all");
        assert_eq!(turn.cost_usd, 0.0);
        assert_eq!(turn.num_turns, 0);
        let error = turn.error.expect("parse error");
        assert!(error.contains("Failed to parse JSON output"));
        assert!(error.contains("boom"));
    }

    #[test]
    fn nonzero_exit_fails_with_stderr() {
        let stdout = r#"{"subtype": "success", "result": "done", "session_id": "s"}"#;
        let turn = normalize_response(&captured(1, stdout, "permission denied\n"));
        assert_eq!(turn.outcome, TurnOutcome::Failed);
        assert_eq!(turn.error.as_deref(), Some("permission denied"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let turn = normalize_response(&captured(0, r#"{"result": "done"}"#, ""));
        assert_eq!(turn.session_id, None);
        assert_eq!(turn.cost_usd, 0.0);
        assert_eq!(turn.num_turns, 1);
    }

    #[test]
    fn missing_binary_message_names_the_cli() {
        let mut cmd = Command::new("claude-binary-that-does-not-exist-5b1c");
        cmd.arg("-p").arg("x");
        let err = process::run_with_timeout(cmd, None, 1024).expect_err("spawn fails");
        let turn = spawn_fault(&err);
        assert_eq!(turn.outcome, TurnOutcome::Failed);
        let error = turn.error.expect("error text");
        assert!(error.contains("claude CLI not found"));
    }
}
