//! Coverage artifact parsing.
//!
//! Two artifact families are understood: Istanbul-style Node output
//! (`coverage-summary.json` for totals, `coverage-final.json` for
//! per-statement data) and the raw Python `coverage.json`, which is carried
//! as an opaque payload. Malformed or missing artifacts never error out of
//! this module; they degrade to "no coverage", which the gate treats as a
//! failure condition, not an exception.

use crate::paths::normalize_relative_path;
use crate::types::{CoverageMetric, CoverageTotals, MetricDimension, UncoveredLinesEntry};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Read and parse a JSON artifact. Missing or malformed files are reported
/// as `None` and logged at debug level.
fn read_json(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            debug!("coverage artifact {} not readable: {}", path.display(), err);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("coverage artifact {} not valid JSON: {}", path.display(), err);
            None
        }
    }
}

/// Extract one metric object of the summary shape
/// `{lines:{pct},statements:{pct},functions:{pct},branches:{pct}}`.
/// Missing or non-numeric `pct` values stay absent; they are never defaulted
/// to 0 or 100.
fn metric_from_entry(entry: &Value) -> CoverageMetric {
    let pct = |dimension: MetricDimension| {
        entry
            .get(dimension.as_str())
            .and_then(|m| m.get("pct"))
            .and_then(Value::as_f64)
    };
    CoverageMetric {
        lines: pct(MetricDimension::Lines),
        statements: pct(MetricDimension::Statements),
        functions: pct(MetricDimension::Functions),
        branches: pct(MetricDimension::Branches),
    }
}

/// Parse a Node `coverage-summary.json` into normalized totals.
///
/// The artifact is a JSON object whose `total` key holds the aggregate
/// metric; every other top-level key that is itself an object becomes a
/// per-file entry (non-object values are ignored). A summary without any
/// per-file keys yields `per_file: None`, which the changed-file gate reads
/// as "per-file data unavailable".
///
/// Returns `None` when the file is missing, unreadable, not JSON, or not an
/// object - the workspace is then reported as missing coverage.
pub fn parse_node_summary(path: &Path) -> Option<CoverageTotals> {
    let value = read_json(path)?;
    let object = value.as_object()?;

    let metric = object
        .get("total")
        .map(metric_from_entry)
        .unwrap_or_default();

    let mut per_file = BTreeMap::new();
    for (key, entry) in object {
        if key == "total" || !entry.is_object() {
            continue;
        }
        let normalized = normalize_relative_path(key);
        if normalized.is_empty() {
            continue;
        }
        per_file.insert(normalized, metric_from_entry(entry));
    }

    Some(CoverageTotals {
        metric,
        per_file: (!per_file.is_empty()).then_some(per_file),
    })
}

/// Load the raw Python `coverage.json` payload. The orchestrator embeds it
/// verbatim; Python percentages never feed the aggregate gate.
pub fn parse_python_coverage(path: &Path) -> Option<Value> {
    read_json(path)
}

/// Resolve `requested` (already normalized, workspace-relative) against a set
/// of recorded keys: exact match first, then the first key that ends with
/// `"/" + requested`. Suffix matching handles artifacts that record files
/// with a longer relative prefix than the caller uses.
pub fn resolve_entry_key<'a, I>(keys: I, requested: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    if requested.is_empty() {
        return None;
    }
    let keys: Vec<(&str, String)> = keys
        .into_iter()
        .map(|key| (key, normalize_relative_path(key)))
        .collect();

    if let Some((key, _)) = keys.iter().find(|(_, normalized)| normalized == requested) {
        return Some(key);
    }
    let suffix = format!("/{}", requested);
    keys.iter()
        .find(|(_, normalized)| normalized.ends_with(&suffix))
        .map(|(key, _)| *key)
}

/// Look up the per-file metric for a changed file using the shared
/// exact-then-suffix resolution.
pub fn resolve_metric<'a>(
    per_file: &'a BTreeMap<String, CoverageMetric>,
    requested: &str,
) -> Option<&'a CoverageMetric> {
    let key = resolve_entry_key(per_file.keys().map(String::as_str), requested)?;
    per_file.get(key)
}

/// The two line-data shapes a `coverage-final.json` entry may carry. Exactly
/// one dispatch point decides which applies (or neither).
enum LineData<'a> {
    /// `l`: map of line number to hit count.
    LineHits(&'a serde_json::Map<String, Value>),
    /// `statementMap` locations plus `s` hit counts, expanded to line ranges.
    Statements {
        locations: &'a serde_json::Map<String, Value>,
        hits: &'a serde_json::Map<String, Value>,
    },
}

impl<'a> LineData<'a> {
    fn from_entry(entry: &'a Value) -> Option<Self> {
        let object = entry.as_object()?;
        if let Some(lines) = object.get("l").and_then(Value::as_object) {
            return Some(Self::LineHits(lines));
        }
        let locations = object.get("statementMap").and_then(Value::as_object)?;
        let hits = object.get("s").and_then(Value::as_object)?;
        Some(Self::Statements { locations, hits })
    }

    /// Uncovered line numbers, ascending and deduplicated.
    fn uncovered_lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = match self {
            Self::LineHits(map) => map
                .iter()
                .filter(|(_, hits)| is_falsy(Some(hits)))
                .filter_map(|(line, _)| line.parse::<u32>().ok())
                .collect(),
            Self::Statements { locations, hits } => {
                let mut collected = Vec::new();
                for (index, location) in locations.iter() {
                    if !is_falsy(hits.get(index).map(|h| &*h)) {
                        continue;
                    }
                    let bound = |which: &str| {
                        location
                            .get(which)
                            .and_then(|b| b.get("line"))
                            .and_then(Value::as_u64)
                    };
                    // Entries without both bounds contribute nothing.
                    let (Some(start), Some(end)) = (bound("start"), bound("end")) else {
                        continue;
                    };
                    for line in start..=end {
                        if let Ok(line) = u32::try_from(line) {
                            collected.push(line);
                        }
                    }
                }
                collected
            }
        };
        lines.sort_unstable();
        lines.dedup();
        lines
    }
}

/// JS-style falsiness for hit counts: absent, null, false, zero, and the
/// empty string all mean "never executed".
fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f == 0.0).unwrap_or(true),
        Some(Value::String(s)) => s.is_empty() || s == "0",
        _ => false,
    }
}

/// Extract uncovered lines for the given target files (already normalized,
/// workspace-relative) from a `coverage-final.json`.
///
/// A target contributes an entry only when it resolves to a usable line-data
/// shape with at least one uncovered line. The overall result is `None` -
/// "could not determine uncovered lines" - whenever no entries were produced;
/// an empty list never stands in for it.
pub fn extract_uncovered_lines(
    final_json_path: &Path,
    workspace: &str,
    targets: &[String],
) -> Option<Vec<UncoveredLinesEntry>> {
    let value = read_json(final_json_path)?;
    let object = value.as_object()?;

    let mut entries = Vec::new();
    for target in targets {
        let Some(key) = resolve_entry_key(object.keys().map(String::as_str), target) else {
            continue;
        };
        let Some(data) = LineData::from_entry(&object[key]) else {
            // Resolved but neither shape usable: no data for this file.
            continue;
        };
        let lines = data.uncovered_lines();
        if !lines.is_empty() {
            entries.push(UncoveredLinesEntry {
                workspace: workspace.to_string(),
                file: target.clone(),
                lines,
            });
        }
    }

    (!entries.is_empty()).then_some(entries)
}

/// Include-all variant: one entry per resolvable file in the artifact,
/// including fully covered files (empty line lists), keyed by the normalized
/// recorded path.
pub fn extract_all_uncovered_lines(
    final_json_path: &Path,
    workspace: &str,
) -> Option<Vec<UncoveredLinesEntry>> {
    let value = read_json(final_json_path)?;
    let object = value.as_object()?;

    let mut entries = Vec::new();
    for (key, entry) in object {
        let Some(data) = LineData::from_entry(entry) else {
            continue;
        };
        let file = normalize_relative_path(key);
        if file.is_empty() {
            continue;
        }
        entries.push(UncoveredLinesEntry {
            workspace: workspace.to_string(),
            file,
            lines: data.uncovered_lines(),
        });
    }

    (!entries.is_empty()).then_some(entries)
}
