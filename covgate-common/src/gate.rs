//! Coverage gate evaluation.
//!
//! Pure comparisons, no I/O. The aggregate gate compares combined totals
//! against thresholds; the changed-file gate holds each changed file's
//! per-file metric to its own threshold set. Composition and workspace
//! bookkeeping live in the orchestrator.

use crate::changed::ChangedFile;
use crate::coverage::resolve_metric;
use crate::types::{CoverageMetric, MetricDimension, Thresholds, UncoveredLinesEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate gate verdict. `missing_dimensions` lists every dimension that
/// is absent, non-finite, or below threshold, in the fixed comparison order,
/// so the first entry is the failure surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateEvaluation {
    pub passed: bool,
    pub missing_dimensions: Vec<MetricDimension>,
}

/// Compare totals against thresholds. A dimension passes iff its value is
/// present, finite, and `>=` the threshold; `None` totals fail every
/// dimension.
pub fn evaluate_totals(totals: Option<&CoverageMetric>, thresholds: &Thresholds) -> GateEvaluation {
    let mut missing_dimensions = Vec::new();
    for dimension in MetricDimension::ORDER {
        let value = totals.and_then(|t| t.get(dimension));
        let passes = matches!(value, Some(v) if v.is_finite() && v >= thresholds.get(dimension));
        if !passes {
            missing_dimensions.push(dimension);
        }
    }
    GateEvaluation {
        passed: missing_dimensions.is_empty(),
        missing_dimensions,
    }
}

/// Why a workspace's changed-file gate was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedFileSkipReason {
    Disabled,
    PerFileCoverageUnavailable,
}

/// Per-workspace changed-file sub-result: either skipped with a reason, or
/// evaluated with a verdict and the min-combined totals over the resolved
/// changed files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceChangedFiles {
    pub workspace: String,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ChangedFileSkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<CoverageMetric>,
}

impl WorkspaceChangedFiles {
    pub fn skipped(workspace: impl Into<String>, reason: ChangedFileSkipReason) -> Self {
        Self {
            workspace: workspace.into(),
            skipped: true,
            reason: Some(reason),
            passed: None,
            totals: None,
        }
    }

    pub fn evaluated(
        workspace: impl Into<String>,
        passed: bool,
        totals: Option<CoverageMetric>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            skipped: false,
            reason: None,
            passed: Some(passed),
            totals,
        }
    }
}

/// Changed-file gate verdict across all workspaces. `missing` lists files
/// that did not resolve to any per-file entry; a file that resolved below
/// threshold is reported through `totals` and the failing verdict, never
/// through `missing`. `thresholds` is the set the verdict was judged
/// against, distinct from the aggregate set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFileGateResult {
    pub passed: bool,
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<CoverageMetric>,
    pub thresholds: Thresholds,
    pub workspaces: Vec<WorkspaceChangedFiles>,
}

/// One workspace's input to the changed-file gate: its attributed changed
/// files and the per-file map from its coverage artifact (`None` when the
/// artifact only exposed aggregate totals).
#[derive(Debug, Clone)]
pub struct WorkspaceChangedInput<'a> {
    pub workspace: &'a str,
    pub files: &'a [ChangedFile],
    pub per_file: Option<&'a BTreeMap<String, CoverageMetric>>,
}

/// Evaluate the changed-file gate.
///
/// Disabled enforcement skips every workspace and passes. A workspace with
/// no attributed changed files passes trivially; one whose artifact has no
/// per-file data is skipped without failing. Otherwise each file's metric is
/// resolved (exact key, then suffix), unresolved files go to `missing`, and
/// the resolved files' per-dimension minimum is held to the thresholds.
pub fn evaluate_changed_files(
    inputs: &[WorkspaceChangedInput<'_>],
    thresholds: &Thresholds,
    enforce: bool,
) -> ChangedFileGateResult {
    if !enforce {
        return ChangedFileGateResult {
            passed: true,
            missing: Vec::new(),
            totals: None,
            thresholds: *thresholds,
            workspaces: inputs
                .iter()
                .map(|input| {
                    WorkspaceChangedFiles::skipped(input.workspace, ChangedFileSkipReason::Disabled)
                })
                .collect(),
        };
    }

    let mut missing = Vec::new();
    let mut combined: Option<CoverageMetric> = None;
    let mut workspaces = Vec::new();
    let mut all_passed = true;

    for input in inputs {
        if input.files.is_empty() {
            // No relevant files changed here: not a failure.
            workspaces.push(WorkspaceChangedFiles::evaluated(input.workspace, true, None));
            continue;
        }
        let Some(per_file) = input.per_file else {
            workspaces.push(WorkspaceChangedFiles::skipped(
                input.workspace,
                ChangedFileSkipReason::PerFileCoverageUnavailable,
            ));
            continue;
        };

        let mut unresolved = 0usize;
        let mut totals: Option<CoverageMetric> = None;
        for file in input.files {
            match resolve_metric(per_file, &file.relative) {
                Some(metric) => {
                    totals = Some(match totals {
                        Some(current) => current.min_with(metric),
                        None => *metric,
                    });
                }
                None => {
                    missing.push(file.original.clone());
                    unresolved += 1;
                }
            }
        }

        let passed = unresolved == 0 && evaluate_totals(totals.as_ref(), thresholds).passed;
        all_passed &= passed;
        if let Some(totals) = totals {
            combined = Some(match combined {
                Some(current) => current.min_with(&totals),
                None => totals,
            });
        }
        workspaces.push(WorkspaceChangedFiles::evaluated(
            input.workspace,
            passed,
            totals,
        ));
    }

    ChangedFileGateResult {
        passed: all_passed && missing.is_empty(),
        missing,
        totals: combined,
        thresholds: *thresholds,
        workspaces,
    }
}

/// The full coverage section of a test-run result: aggregate verdict,
/// workspaces that produced no coverage, combined totals, uncovered lines,
/// and the changed-file sub-gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageGateResult {
    pub passed: bool,
    /// Names of detected workspaces whose coverage artifact was absent or
    /// unparseable; non-empty always forces `passed: false`.
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<CoverageMetric>,
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncovered_lines: Option<Vec<UncoveredLinesEntry>>,
    pub changed_files: ChangedFileGateResult,
}
