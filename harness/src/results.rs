//! Durable per-test records.
//!
//! Each test writes one JSON file into a run-scoped results directory the
//! moment it finishes, so an interrupted suite loses at most the in-flight
//! test. Records are never rewritten; aggregation re-reads them from disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::invoke::TurnResult;

pub const SCHEMA_VERSION: &str = "1.0";

/// Directory under the agent dir holding result runs for all suites.
pub const RESULTS_ROOT: &str = ".agent-test-results";

/// Aggregate output files, regenerated by every aggregation pass.
pub const SUMMARY_FILE: &str = "aggregate-summary.json";
pub const REPORT_FILE: &str = "aggregate-report.md";

/// The durable unit of record for one executed test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub schema_version: String,
    pub test_id: String,
    /// True iff the attempt turn succeeded; reflection never flips this.
    pub success: bool,
    pub attempt: TurnResult,
    /// Absent when the attempt yielded no session to continue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<TurnResult>,
    /// Summed across both turns.
    pub total_cost_usd: f64,
    pub duration_seconds: f64,
    /// RFC 3339, start of the test.
    pub timestamp: String,
}

/// Create the run-scoped results directory for a fresh suite run.
pub fn create_results_dir(agent_dir: &Path, suite_name: &str) -> Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let dir = agent_dir.join(RESULTS_ROOT).join(suite_name).join(timestamp);
    fs::create_dir_all(&dir)
        .with_context(|| format!("create results dir {}", dir.display()))?;
    Ok(dir)
}

/// Write one test record. Called exactly once per test, before the suite
/// advances to the next case.
pub fn write_test_result(results_dir: &Path, result: &TestResult) -> Result<PathBuf> {
    let path = results_dir.join(format!("{}.json", result.test_id));
    let contents = serde_json::to_string_pretty(result).context("serialize test result")?;
    fs::write(&path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), "test result written");
    Ok(path)
}

/// Load every test record in a results directory, in file name order.
///
/// Only `*.json` files count; names starting with `_` and aggregate outputs
/// are excluded. A record that fails to read or parse becomes a warning,
/// never a fatal error.
pub fn load_test_results(results_dir: &Path) -> Result<(Vec<TestResult>, Vec<String>)> {
    if !results_dir.is_dir() {
        bail!("results directory not found: {}", results_dir.display());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(results_dir)
        .with_context(|| format!("read {}", results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".json") || name.starts_with('_') || name == SUMMARY_FILE {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    let mut results = Vec::new();
    let mut warnings = Vec::new();
    for path in paths {
        let loaded = fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))
            .and_then(|contents| {
                serde_json::from_str::<TestResult>(&contents).context("parse record")
            });
        match loaded {
            Ok(record) => results.push(record),
            Err(err) => warnings.push(format!("skip {}: {err:#}", path.display())),
        }
    }

    Ok((results, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{TurnOutcome, TurnResult};
    use tempfile::tempdir;

    fn turn(outcome: TurnOutcome, session: Option<&str>) -> TurnResult {
        TurnResult {
            outcome,
            result: "done".to_string(),
            session_id: session.map(str::to_string),
            cost_usd: 0.02,
            num_turns: 3,
            error: None,
        }
    }

    fn record(test_id: &str, success: bool) -> TestResult {
        TestResult {
            schema_version: SCHEMA_VERSION.to_string(),
            test_id: test_id.to_string(),
            success,
            attempt: turn(
                if success {
                    TurnOutcome::Succeeded
                } else {
                    TurnOutcome::Failed
                },
                Some("sess"),
            ),
            reflection: Some(turn(TurnOutcome::Succeeded, None)),
            total_cost_usd: 0.04,
            duration_seconds: 12.5,
            timestamp: "2026-08-07T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn written_records_round_trip() {
        let temp = tempdir().expect("tempdir");
        let original = record("lookup-basic", true);
        write_test_result(temp.path(), &original).expect("write");

        let (loaded, warnings) = load_test_results(temp.path()).expect("load");
        assert!(warnings.is_empty());
        assert_eq!(loaded, vec![original]);
    }

    #[test]
    fn malformed_record_becomes_a_warning() {
        let temp = tempdir().expect("tempdir");
        write_test_result(temp.path(), &record("good", true)).expect("write");
        fs::write(temp.path().join("broken.json"), "{not json").expect("write broken");

        let (loaded, warnings) = load_test_results(temp.path()).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].test_id, "good");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("broken.json"));
    }

    #[test]
    fn loader_skips_aggregate_and_underscore_files() {
        let temp = tempdir().expect("tempdir");
        write_test_result(temp.path(), &record("only", true)).expect("write");
        fs::write(temp.path().join("_aggregation.json"), "{}").expect("write underscore");
        fs::write(temp.path().join(SUMMARY_FILE), "{}").expect("write summary");
        fs::write(temp.path().join(REPORT_FILE), "# report").expect("write report");

        let (loaded, warnings) = load_test_results(temp.path()).expect("load");
        assert!(warnings.is_empty());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].test_id, "only");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("nope");
        let err = load_test_results(&missing).expect_err("missing dir");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn results_dir_is_run_scoped() {
        let temp = tempdir().expect("tempdir");
        let dir = create_results_dir(temp.path(), "my-suite").expect("create");
        assert!(dir.is_dir());
        assert!(dir.starts_with(temp.path().join(RESULTS_ROOT).join("my-suite")));
    }
}
