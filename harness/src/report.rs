//! Aggregate outputs: structured summary and human-readable report.
//!
//! Both files are derived and disposable. Re-running the aggregation pass
//! over an unchanged directory reproduces the same statistics, rankings, and
//! failed-test list; only the generation timestamp moves.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::results::{self, REPORT_FILE, RESULTS_ROOT, SCHEMA_VERSION, SUMMARY_FILE, TestResult};
use crate::stats::{self, Statistics};
use crate::suggestions;

/// Fallback when a failing record carries no error anywhere.
const NO_ERROR_FALLBACK: &str = "Test failed (no specific error message)";

/// One failing test with its best-effort error string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedTest {
    pub test_id: String,
    pub error: String,
}

/// The `aggregate-summary.json` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub schema_version: String,
    pub suite_name: String,
    /// Generation time, RFC 3339.
    pub timestamp: String,
    pub results_directory: String,
    pub statistics: Statistics,
    pub all_improvement_suggestions: Vec<String>,
    pub what_worked: Vec<String>,
    pub what_didnt_work: Vec<String>,
    pub failed_tests: Vec<FailedTest>,
}

/// Reduce a results directory into `aggregate-summary.json` and
/// `aggregate-report.md`, overwriting previous aggregate outputs.
///
/// Returns the summary plus per-record warnings; malformed records are
/// skipped, never fatal.
#[instrument(skip_all, fields(results_dir = %results_dir.display()))]
pub fn aggregate(results_dir: &Path) -> Result<(Summary, Vec<String>)> {
    let (results, warnings) = results::load_test_results(results_dir)?;
    debug!(records = results.len(), skipped = warnings.len(), "records loaded");

    let generated_at = Utc::now();
    let statistics = stats::calculate(&results);
    let feedback = suggestions::collect(&results);
    let failed_tests = collect_failed(&results);

    let summary = Summary {
        schema_version: SCHEMA_VERSION.to_string(),
        suite_name: suite_name_for(results_dir),
        timestamp: generated_at.to_rfc3339(),
        results_directory: results_dir.display().to_string(),
        statistics,
        all_improvement_suggestions: feedback.improvement_suggestions,
        what_worked: feedback.what_worked,
        what_didnt_work: feedback.what_didnt_work,
        failed_tests,
    };

    let contents = serde_json::to_string_pretty(&summary).context("serialize summary")?;
    let summary_path = results_dir.join(SUMMARY_FILE);
    fs::write(&summary_path, format!("{contents}\n"))
        .with_context(|| format!("write {}", summary_path.display()))?;

    let report_path = results_dir.join(REPORT_FILE);
    fs::write(&report_path, render_report(&summary, generated_at))
        .with_context(|| format!("write {}", report_path.display()))?;

    Ok((summary, warnings))
}

/// Derive the suite name from a results directory path.
///
/// The run layout is `<agent_dir>/.agent-test-results/<suite>/<timestamp>/`;
/// a path outside that layout falls back to its own directory name.
pub fn suite_name_for(results_dir: &Path) -> String {
    let under_results_root = results_dir
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .is_some_and(|name| name == RESULTS_ROOT);
    if under_results_root
        && let Some(suite) = results_dir.parent().and_then(Path::file_name)
    {
        return suite.to_string_lossy().into_owned();
    }
    results_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| results_dir.display().to_string())
}

fn collect_failed(results: &[TestResult]) -> Vec<FailedTest> {
    results
        .iter()
        .filter(|result| !result.success)
        .map(|result| FailedTest {
            test_id: result.test_id.clone(),
            error: best_effort_error(result),
        })
        .collect()
}

fn best_effort_error(result: &TestResult) -> String {
    let attempt_error = result.attempt.error.as_deref();
    let reflection_error = result
        .reflection
        .as_ref()
        .and_then(|turn| turn.error.as_deref());
    attempt_error
        .or(reflection_error)
        .filter(|error| !error.trim().is_empty())
        .unwrap_or(NO_ERROR_FALLBACK)
        .to_string()
}

/// Humanize a duration: `42s` below a minute, `3m 5s` above.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.0}s");
    }
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    if secs == 0 {
        format!("{minutes}m")
    } else {
        format!("{minutes}m {secs}s")
    }
}

pub fn format_cost(cost: f64) -> String {
    format!("${cost:.2}")
}

fn render_report(summary: &Summary, generated_at: DateTime<Utc>) -> String {
    let stats = &summary.statistics;
    let success_pct = (stats.success_rate * 100.0) as i64;
    let total_cost = format_cost(stats.total_cost_usd);
    let total_duration = format_duration(stats.total_duration_seconds);

    let mut lines = vec![
        format!("# Test Suite Results: {}", summary.suite_name),
        String::new(),
        format!("**Run:** {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("**Duration:** {total_duration}"),
        format!("**Cost:** {total_cost}"),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        "| Metric | Value |".to_string(),
        "|--------|-------|".to_string(),
        format!("| Total Tests | {} |", stats.total_tests),
        format!("| Passed | {} ({success_pct}%) |", stats.passed),
        format!("| Failed | {} |", stats.failed),
        format!("| Total Cost | {total_cost} |"),
        format!("| Total Duration | {total_duration} |"),
        format!("| Avg Cost/Test | {} |", format_cost(stats.avg_cost_per_test)),
        format!(
            "| Avg Duration/Test | {} |",
            format_duration(stats.avg_duration_per_test)
        ),
        format!("| Avg Turns/Test | {} |", stats.avg_turns_per_test),
        String::new(),
    ];

    if !summary.failed_tests.is_empty() {
        lines.push("## Failed Tests".to_string());
        lines.push(String::new());
        for failed in &summary.failed_tests {
            lines.push(format!("### {}", failed.test_id));
            lines.push(format!("- **Error:** {}", failed.error));
            lines.push(String::new());
        }
    }

    if !summary.all_improvement_suggestions.is_empty() {
        lines.push("## Improvement Suggestions".to_string());
        lines.push(String::new());
        lines.push("The following suggestions were collected from agent reflections:".to_string());
        lines.push(String::new());
        for (index, suggestion) in summary.all_improvement_suggestions.iter().enumerate() {
            lines.push(format!("{}. {suggestion}", index + 1));
        }
        lines.push(String::new());
    }

    if !summary.what_worked.is_empty() {
        lines.push("## What Worked Well".to_string());
        lines.push(String::new());
        for item in &summary.what_worked {
            lines.push(format!("- {item}"));
        }
        lines.push(String::new());
    }

    if !summary.what_didnt_work.is_empty() {
        lines.push("## What Didn't Work".to_string());
        lines.push(String::new());
        for item in &summary.what_didnt_work {
            lines.push(format!("- {item}"));
        }
        lines.push(String::new());
    }

    lines.push("---".to_string());
    lines.push("*Generated by agent-test-harness*".to_string());
    lines.push(String::new());

    lines.join("\n")
}
