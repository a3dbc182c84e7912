//! Qualitative feedback aggregation across a result batch.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::reflection::parse_reflection;
use crate::results::TestResult;

/// Deduplicated feedback from all reflection turns of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestionSummary {
    /// Distinct suggestions, most frequent first; ties keep first-seen order.
    pub improvement_suggestions: Vec<String>,
    /// Distinct "what worked" strings, lexicographic.
    pub what_worked: Vec<String>,
    /// Distinct "what didn't work" strings, lexicographic.
    pub what_didnt_work: Vec<String>,
    /// Occurrence count per suggestion.
    pub suggestion_counts: BTreeMap<String, usize>,
}

/// Collect and rank feedback across results, visited in batch order.
///
/// Membership is exact trimmed-string equality; near-duplicate phrasings are
/// deliberately kept apart. Empty strings are dropped.
pub fn collect(results: &[TestResult]) -> SuggestionSummary {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut first_seen: Vec<String> = Vec::new();
    let mut worked: BTreeSet<String> = BTreeSet::new();
    let mut didnt_work: BTreeSet<String> = BTreeSet::new();

    for result in results {
        let parsed = parse_reflection(result.reflection.as_ref());
        for suggestion in &parsed.improvement_suggestions {
            let trimmed = suggestion.trim();
            if trimmed.is_empty() {
                continue;
            }
            let entry = counts.entry(trimmed.to_string()).or_insert(0);
            if *entry == 0 {
                first_seen.push(trimmed.to_string());
            }
            *entry += 1;
        }
        for item in &parsed.what_worked {
            let trimmed = item.trim();
            if !trimmed.is_empty() {
                worked.insert(trimmed.to_string());
            }
        }
        for item in &parsed.what_didnt_work {
            let trimmed = item.trim();
            if !trimmed.is_empty() {
                didnt_work.insert(trimmed.to_string());
            }
        }
    }

    // Stable sort keeps first-seen order within equal counts.
    let mut ranked = first_seen;
    ranked.sort_by(|a, b| counts[b.as_str()].cmp(&counts[a.as_str()]));

    SuggestionSummary {
        improvement_suggestions: ranked,
        what_worked: worked.into_iter().collect(),
        what_didnt_work: didnt_work.into_iter().collect(),
        suggestion_counts: counts,
    }
}
