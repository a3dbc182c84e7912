//! Test and suite execution.
//!
//! Each test is a two-turn exchange: the task attempt, then a reflection
//! turn resumed on the same session. The reflection is informational only;
//! overall success tracks the attempt alone, and neither turn is retried.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::invoke::{Invoke, TurnRequest};
use crate::report::{format_cost, format_duration};
use crate::results::{self, SCHEMA_VERSION, TestResult};
use crate::stats::round_to;
use crate::suite::{SuiteFile, TestSpec};

/// Turn limit for the reflection exchange; introspection needs no tool use.
const REFLECTION_MAX_TURNS: u32 = 2;

/// Fixed prompt for the reflection turn, identical across suites.
const REFLECTION_PROMPT: &str = "Now that you've completed the task, please reflect on your process:

1. **Process**: What steps did you take to answer this question?
2. **What Worked**: What aspects of the skill, data structure, or instructions helped you succeed?
3. **What Didn't Work**: What was confusing, inefficient, or required workarounds?
4. **Improvements**: How could the skill, data structure, or instructions be improved to make this easier?

Respond in JSON format with keys: process_steps, what_worked, what_didnt_work, improvement_suggestions (all arrays of strings).";

/// Shared execution settings for one suite run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Per-turn wall-clock bound; `None` means wait indefinitely.
    pub timeout: Option<Duration>,
    /// Recursion depth of this harness process.
    pub depth: u32,
}

/// Run one test: attempt turn, reflection turn when a session is available,
/// then persist the record before returning.
#[instrument(skip_all, fields(test_id = %test.id))]
pub fn run_single_test<I: Invoke>(
    invoker: &I,
    test: &TestSpec,
    suite: &SuiteFile,
    settings: &RunSettings,
    results_dir: &Path,
) -> Result<TestResult> {
    let started = Instant::now();
    let timestamp = Utc::now().to_rfc3339();

    let mut attempt = invoker.invoke(&TurnRequest {
        prompt: test.prompt.clone(),
        agent_dir: suite.agent_dir.clone(),
        session_id: None,
        max_turns: test.max_turns.unwrap_or(suite.max_turns),
        allowed_tools: suite.allowed_tools.clone(),
        permission_mode: suite.permission_mode.clone(),
        timeout: settings.timeout,
        depth: settings.depth,
    });

    let mut total_cost = attempt.cost_usd;
    let mut reflection = None;
    let success;

    match attempt.session_id.clone() {
        None => {
            // Reflection needs conversational continuity; without a session
            // the test fails outright.
            success = false;
            let note = "No session_id returned from attempt turn.";
            attempt.error = Some(match attempt.error.take() {
                Some(existing) => format!("{existing} {note}"),
                None => note.to_string(),
            });
            warn!("attempt returned no session id, skipping reflection");
        }
        Some(session) => {
            let turn = invoker.invoke(&TurnRequest {
                prompt: REFLECTION_PROMPT.to_string(),
                agent_dir: suite.agent_dir.clone(),
                session_id: Some(session),
                max_turns: REFLECTION_MAX_TURNS,
                allowed_tools: None,
                permission_mode: None,
                timeout: settings.timeout,
                depth: settings.depth,
            });
            total_cost += turn.cost_usd;
            reflection = Some(turn);
            success = attempt.succeeded();
        }
    }

    let result = TestResult {
        schema_version: SCHEMA_VERSION.to_string(),
        test_id: test.id.clone(),
        success,
        attempt,
        reflection,
        total_cost_usd: total_cost,
        duration_seconds: round_to(started.elapsed().as_secs_f64(), 2),
        timestamp,
    };

    results::write_test_result(results_dir, &result)?;
    Ok(result)
}

/// Run every test in order, printing live progress and persisting each
/// result before moving on. The running totals here are display only; the
/// authoritative numbers come from re-reading the persisted records.
#[instrument(skip_all, fields(suite = %suite.name, tests = suite.tests.len()))]
pub fn run_suite<I: Invoke>(
    invoker: &I,
    suite: &SuiteFile,
    settings: &RunSettings,
    results_dir: &Path,
) -> Result<Vec<TestResult>> {
    let total = suite.tests.len();
    let mut results = Vec::with_capacity(total);
    let mut passed = 0usize;
    let mut total_cost = 0.0f64;
    let started = Instant::now();

    println!("\nRunning {total} tests...\n");

    for (index, test) in suite.tests.iter().enumerate() {
        print!("[{}/{}] {} ", index + 1, total, test.id);
        std::io::stdout().flush().ok();

        let result = run_single_test(invoker, test, suite, settings, results_dir)?;

        if result.success {
            passed += 1;
        }
        total_cost += result.total_cost_usd;

        let dots = ".".repeat(50usize.saturating_sub(test.id.len()).max(1));
        let status = if result.success { "PASS" } else { "FAIL" };
        println!(
            "{dots} {status} ({}, {})",
            format_cost(result.total_cost_usd),
            format_duration(result.duration_seconds)
        );

        results.push(result);
    }

    println!("\n{}", "=".repeat(60));
    let symbol = if passed == total { "✓" } else { "✗" };
    println!(
        "{symbol} {passed}/{total} passed | Total: {} | Duration: {}",
        format_cost(total_cost),
        format_duration(started.elapsed().as_secs_f64())
    );
    println!("Results saved to: {}", results_dir.display());

    info!(passed, total, "suite finished");
    Ok(results)
}
