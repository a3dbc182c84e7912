//! Aggregate statistics over a batch of test results.

use serde::{Deserialize, Serialize};

use crate::results::TestResult;

/// Reduced numeric view of a result set. All rates and averages are zero for
/// an empty batch; no division faults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub total_cost_usd: f64,
    pub total_duration_seconds: f64,
    pub avg_turns_per_test: f64,
    pub avg_cost_per_test: f64,
    pub avg_duration_per_test: f64,
}

/// Reduce test results to summary statistics.
///
/// Rounding is display stability only: rate 3 decimals, costs 4, durations 2,
/// turns 1. Turn counts come from attempt turns alone.
pub fn calculate(results: &[TestResult]) -> Statistics {
    if results.is_empty() {
        return Statistics::default();
    }

    let total_tests = results.len();
    let passed = results.iter().filter(|r| r.success).count();
    let failed = total_tests - passed;
    let total_cost: f64 = results.iter().map(|r| r.total_cost_usd).sum();
    let total_duration: f64 = results.iter().map(|r| r.duration_seconds).sum();
    let total_turns: u64 = results.iter().map(|r| u64::from(r.attempt.num_turns)).sum();
    let count = total_tests as f64;

    Statistics {
        total_tests,
        passed,
        failed,
        success_rate: round_to(passed as f64 / count, 3),
        total_cost_usd: round_to(total_cost, 4),
        total_duration_seconds: round_to(total_duration, 2),
        avg_turns_per_test: round_to(total_turns as f64 / count, 1),
        avg_cost_per_test: round_to(total_cost / count, 4),
        avg_duration_per_test: round_to(total_duration / count, 2),
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{TurnOutcome, TurnResult};
    use crate::results::SCHEMA_VERSION;

    fn record(success: bool, cost: f64, duration: f64, turns: u32) -> TestResult {
        TestResult {
            schema_version: SCHEMA_VERSION.to_string(),
            test_id: "t".to_string(),
            success,
            attempt: TurnResult {
                outcome: if success {
                    TurnOutcome::Succeeded
                } else {
                    TurnOutcome::Failed
                },
                result: String::new(),
                session_id: None,
                cost_usd: cost,
                num_turns: turns,
                error: None,
            },
            reflection: None,
            total_cost_usd: cost,
            duration_seconds: duration,
            timestamp: "2026-08-07T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn empty_batch_is_all_zero() {
        let stats = calculate(&[]);
        assert_eq!(stats, Statistics::default());
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.total_tests, 0);
    }

    #[test]
    fn counts_balance_and_rate_matches() {
        let results = vec![
            record(true, 0.10, 10.0, 4),
            record(true, 0.20, 20.0, 6),
            record(false, 0.30, 30.0, 2),
            record(false, 0.40, 40.0, 8),
        ];
        let stats = calculate(&results);
        assert_eq!(stats.passed + stats.failed, stats.total_tests);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(stats.total_cost_usd, 1.0);
        assert_eq!(stats.total_duration_seconds, 100.0);
        assert_eq!(stats.avg_turns_per_test, 5.0);
        assert_eq!(stats.avg_cost_per_test, 0.25);
        assert_eq!(stats.avg_duration_per_test, 25.0);
    }

    #[test]
    fn rates_are_rounded_for_display() {
        let results = vec![
            record(true, 0.1, 1.0, 1),
            record(false, 0.1, 1.0, 1),
            record(false, 0.1, 1.0, 1),
        ];
        let stats = calculate(&results);
        assert_eq!(stats.success_rate, 0.333);
        assert_eq!(stats.avg_cost_per_test, 0.1);
    }
}
