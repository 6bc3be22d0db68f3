//! Result Normalizer - tool output to `Finding` records
//!
//! Accepts the three shapes detection tools emit:
//! - a JSON array of records
//! - a single JSON object
//! - newline-delimited JSON objects (unparsable lines are dropped)
//!
//! Each record is mapped field by field with defaults, so one malformed
//! record never aborts normalization of the rest.

mod record;

pub use record::normalize_record;

use harrow_common::{Finding, SeverityStats};
use serde_json::Value;
use tracing::debug;

/// Parse raw tool output into top-level JSON records.
pub fn parse_records(raw: &str) -> Vec<Value> {
    let content = raw.trim();
    if content.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => items,
        Ok(other) => vec![other],
        Err(_) => {
            let mut records = Vec::new();
            let mut dropped = 0usize;
            for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                match serde_json::from_str::<Value>(line) {
                    Ok(value) => records.push(value),
                    Err(_) => dropped += 1,
                }
            }
            if dropped > 0 {
                debug!(dropped, kept = records.len(), "skipped unparsable result lines");
            }
            records
        }
    }
}

/// Normalize raw tool output into findings.
pub fn normalize(raw: &str) -> Vec<Finding> {
    parse_records(raw)
        .iter()
        .filter_map(normalize_record)
        .collect()
}

/// Normalize and bucket by severity in one pass.
pub fn normalize_with_stats(raw: &str) -> (Vec<Finding>, SeverityStats) {
    let findings = normalize(raw);
    let stats = SeverityStats::from_findings(&findings);
    (findings, stats)
}
