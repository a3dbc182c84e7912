//! CLI command implementations.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::depth;
use crate::exit_codes;
use crate::invoke::ClaudeInvoker;
use crate::report;
use crate::results;
use crate::runner::{self, RunSettings};
use crate::suite::SuiteFile;

/// Rough per-test cost estimate printed before a run, in USD.
const COST_PER_TEST_ESTIMATE: f64 = 0.08;

/// Run a suite end-to-end, then aggregate the results directory it produced.
pub fn run_suite(suite_path: &Path, timeout: Option<Duration>) -> Result<i32> {
    let depth = depth::inherited_depth();
    if depth::check_depth(depth).is_err() {
        eprintln!(
            "error: maximum test recursion depth ({}) exceeded",
            depth::MAX_DEPTH
        );
        return Ok(exit_codes::DEPTH_EXCEEDED);
    }
    if depth > 0 {
        println!("[Note: Running at recursion depth {depth}]");
    }

    let suite = SuiteFile::load(suite_path).context("load suite")?;
    info!(suite = %suite.name, tests = suite.tests.len(), "suite loaded");

    println!("\nTest Suite: {}", suite.name);
    if let Some(description) = &suite.description {
        println!("Description: {description}");
    }
    println!("Agent directory: {}", suite.agent_dir.display());
    println!("Tests to run: {}", suite.tests.len());
    let estimate = suite.tests.len() as f64 * COST_PER_TEST_ESTIMATE;
    println!("Estimated cost: ~{}", report::format_cost(estimate));

    let results_dir = results::create_results_dir(&suite.agent_dir, &suite.name)?;
    let settings = RunSettings { timeout, depth };
    let run_results = runner::run_suite(&ClaudeInvoker, &suite, &settings, &results_dir)?;

    // Aggregation is an ordinary function call over the directory just
    // written, never a second process.
    let (summary, warnings) = report::aggregate(&results_dir).context("aggregate results")?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    print_top_suggestions(&summary.all_improvement_suggestions, 5);

    let all_passed = run_results.iter().all(|result| result.success);
    Ok(if all_passed {
        exit_codes::OK
    } else {
        exit_codes::TESTS_FAILED
    })
}

/// Re-run the aggregation pass over an existing results directory.
pub fn aggregate_dir(results_dir: &Path) -> Result<i32> {
    println!("Loading results from: {}", results_dir.display());
    let (summary, warnings) = report::aggregate(results_dir)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    let stats = &summary.statistics;
    println!("Found {} test result(s)", stats.total_tests);
    println!("\nOutput files written:");
    println!("  - {}", results_dir.join(results::SUMMARY_FILE).display());
    println!("  - {}", results_dir.join(results::REPORT_FILE).display());
    println!("\n{}", "=".repeat(60));
    println!("Summary: {}/{} passed", stats.passed, stats.total_tests);
    println!("Total cost: {}", report::format_cost(stats.total_cost_usd));
    println!(
        "Total duration: {}",
        report::format_duration(stats.total_duration_seconds)
    );
    print_top_suggestions(&summary.all_improvement_suggestions, 3);

    Ok(exit_codes::OK)
}

/// Validate a suite file without running any tests.
pub fn validate_suite(suite_path: &Path) -> Result<i32> {
    println!("Dry run: validating {}\n", suite_path.display());
    match SuiteFile::load(suite_path) {
        Ok(suite) => {
            println!("  [✓] suite file parses");
            println!("  [✓] agent_dir exists: {}", suite.agent_dir.display());
            println!("  [✓] all {} test ids are unique", suite.tests.len());
            println!("\nValidation passed!");
            Ok(exit_codes::OK)
        }
        Err(err) => {
            println!("  [✗] {err:#}");
            println!("\nValidation failed!");
            Ok(exit_codes::INVALID)
        }
    }
}

fn print_top_suggestions(suggestions: &[String], limit: usize) {
    if suggestions.is_empty() {
        return;
    }
    println!("\nImprovement Suggestions ({}):", suggestions.len());
    for suggestion in suggestions.iter().take(limit) {
        println!("  - {suggestion}");
    }
    if suggestions.len() > limit {
        println!("  ... and {} more", suggestions.len() - limit);
    }
}
