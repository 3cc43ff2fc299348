//! Test coverage report over declared capabilities and behaviors.
//!
//! `overall = (full_weight + partial_weight / 2) / total_weight * 100`,
//! rounded to two decimal places and clamped to `[0, 100]`. A tree with no
//! trackable items (or zero total weight) reports `0`.

use serde::Serialize;
use serde_json::Value;

use crate::domain::resolved::ResolvedSpec;
use crate::ir::error::IrResult;
use crate::ir::section::{entries, Entry};
use crate::ir::{capabilities, flows};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Full,
    Partial,
    Untested,
}

/// Coverage classification of one trackable item.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoverageItem {
    pub id: String,
    /// `capability` or `behavior`.
    pub kind: String,
    pub status: CoverageStatus,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSummary {
    pub overall: f64,
    pub fully_tested: usize,
    pub partially_tested: usize,
    pub untested: usize,
    pub details: Vec<CoverageItem>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoverageDocument {
    pub coverage: CoverageSummary,
}

/// Classify every capability and behavior and summarize weighted coverage.
pub fn lower_coverage(spec: &ResolvedSpec) -> IrResult<CoverageDocument> {
    let (behavior_section, behavior_value) = match spec.section(flows::SECTION) {
        Some(v) => (flows::SECTION, Some(v)),
        None => (flows::FALLBACK_SECTION, spec.section(flows::FALLBACK_SECTION)),
    };

    let mut details = Vec::new();
    for entry in entries(capabilities::SECTION, spec.section(capabilities::SECTION))? {
        details.push(classify(&entry, "capability"));
    }
    for entry in entries(behavior_section, behavior_value)? {
        details.push(classify(&entry, "behavior"));
    }

    Ok(CoverageDocument {
        coverage: summarize(details),
    })
}

fn classify(entry: &Entry<'_>, kind: &str) -> CoverageItem {
    let status = entry
        .text(&["coverage"])
        .and_then(explicit_status)
        .unwrap_or_else(|| status_from_tests(entry.field("tests")));

    let weight = entry
        .field("weight")
        .and_then(Value::as_f64)
        .filter(|w| w.is_finite() && *w >= 0.0)
        .unwrap_or(1.0);

    CoverageItem {
        id: entry.id.clone(),
        kind: kind.to_string(),
        status,
        weight,
    }
}

fn explicit_status(declared: &str) -> Option<CoverageStatus> {
    match declared.to_ascii_lowercase().as_str() {
        "full" | "fully_tested" | "tested" | "covered" => Some(CoverageStatus::Full),
        "partial" | "partially_tested" => Some(CoverageStatus::Partial),
        "none" | "untested" | "uncovered" => Some(CoverageStatus::Untested),
        _ => None,
    }
}

/// All tests passing is full coverage; any declared tests short of that is
/// partial; no tests is untested.
fn status_from_tests(tests: Option<&Value>) -> CoverageStatus {
    let Some(Value::Array(tests)) = tests else {
        return CoverageStatus::Untested;
    };
    if tests.is_empty() {
        return CoverageStatus::Untested;
    }

    let passing = tests.iter().filter(|t| is_passing(t)).count();
    if passing == tests.len() {
        CoverageStatus::Full
    } else {
        CoverageStatus::Partial
    }
}

fn is_passing(test: &Value) -> bool {
    match test {
        Value::String(_) => true,
        Value::Object(obj) => match obj.get("status").and_then(Value::as_str) {
            None => true,
            Some(status) => matches!(
                status.to_ascii_lowercase().as_str(),
                "pass" | "passed" | "passing" | "ok"
            ),
        },
        _ => false,
    }
}

/// Round to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn summarize(details: Vec<CoverageItem>) -> CoverageSummary {
    // Weights are scaled by the largest one so the sums stay finite.
    let max_weight = details.iter().map(|item| item.weight).fold(0.0, f64::max);

    let mut full_weight = 0.0;
    let mut partial_weight = 0.0;
    let mut total_weight = 0.0;
    let (mut fully_tested, mut partially_tested, mut untested) = (0, 0, 0);

    for item in &details {
        let weight = if max_weight > 0.0 {
            item.weight / max_weight
        } else {
            0.0
        };
        total_weight += weight;
        match item.status {
            CoverageStatus::Full => {
                fully_tested += 1;
                full_weight += weight;
            }
            CoverageStatus::Partial => {
                partially_tested += 1;
                partial_weight += weight;
            }
            CoverageStatus::Untested => untested += 1,
        }
    }

    let ratio = if total_weight > 0.0 {
        (full_weight + partial_weight * 0.5) / total_weight * 100.0
    } else {
        0.0
    };
    let overall = if ratio.is_finite() {
        round2(ratio).clamp(0.0, 100.0)
    } else {
        0.0
    };

    CoverageSummary {
        overall,
        fully_tested,
        partially_tested,
        untested,
        details,
    }
}
