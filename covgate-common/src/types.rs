//! Core data model shared across covgate components.
//!
//! Types that cross the wire to the JS-facing test-run record use camelCase
//! field names; internal configuration stays snake_case.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of a testable workspace inside a project tree. Declaration order is
/// the stable result order (root, frontend, backend, backend-python).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceKind {
    /// Node package at the project root (fallback when no frontend/backend).
    RootNode,
    /// Node package under `frontend/`.
    FrontendNode,
    /// Node package under `backend/`.
    BackendNode,
    /// Python package under `backend/` (marked by requirements.txt).
    BackendPython,
}

impl WorkspaceKind {
    /// Kebab-case identifier as persisted in test-run records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RootNode => "root-node",
            Self::FrontendNode => "frontend-node",
            Self::BackendNode => "backend-node",
            Self::BackendPython => "backend-python",
        }
    }

    /// Short workspace name used in gate results and uncovered-line entries.
    pub fn workspace_name(&self) -> &'static str {
        match self {
            Self::RootNode => "root",
            Self::FrontendNode => "frontend",
            Self::BackendNode => "backend",
            Self::BackendPython => "backend-python",
        }
    }

    /// Stable ordering for aggregated results: root, frontend, backend-node,
    /// backend-python.
    pub fn rank(&self) -> u8 {
        match self {
            Self::RootNode => 0,
            Self::FrontendNode => 1,
            Self::BackendNode => 2,
            Self::BackendPython => 3,
        }
    }

    /// Whether this workspace produces Istanbul-style Node coverage.
    pub fn is_node(&self) -> bool {
        !matches!(self, Self::BackendPython)
    }
}

impl std::fmt::Display for WorkspaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved test command for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TestCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for TestCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// An independently testable subtree, created fresh per orchestration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub kind: WorkspaceKind,
    /// Absolute directory the test command runs in.
    pub directory: PathBuf,
    pub test_command: Option<TestCommand>,
}

impl Workspace {
    /// Short name for results (`root`, `frontend`, `backend`,
    /// `backend-python`).
    pub fn name(&self) -> &'static str {
        self.kind.workspace_name()
    }

    /// Expected `coverage-summary.json` location (Node workspaces only).
    pub fn coverage_summary_path(&self) -> Option<PathBuf> {
        self.kind
            .is_node()
            .then(|| self.directory.join("coverage").join("coverage-summary.json"))
    }

    /// Expected `coverage-final.json` location (Node workspaces only).
    pub fn coverage_final_path(&self) -> Option<PathBuf> {
        self.kind
            .is_node()
            .then(|| self.directory.join("coverage").join("coverage-final.json"))
    }

    /// Expected raw Python `coverage.json` location.
    pub fn python_coverage_path(&self) -> Option<PathBuf> {
        matches!(self.kind, WorkspaceKind::BackendPython)
            .then(|| self.directory.join("coverage.json"))
    }
}

/// Four-dimension coverage percentages; absent dimensions are not-evaluable
/// and always fail the gate rather than defaulting to 0 or 100.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageMetric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statements: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<f64>,
}

impl CoverageMetric {
    /// Metric with every dimension set to `pct`.
    pub fn uniform(pct: f64) -> Self {
        Self {
            lines: Some(pct),
            statements: Some(pct),
            functions: Some(pct),
            branches: Some(pct),
        }
    }

    pub fn get(&self, dimension: MetricDimension) -> Option<f64> {
        match dimension {
            MetricDimension::Lines => self.lines,
            MetricDimension::Statements => self.statements,
            MetricDimension::Functions => self.functions,
            MetricDimension::Branches => self.branches,
        }
    }

    fn set(&mut self, dimension: MetricDimension, value: Option<f64>) {
        match dimension {
            MetricDimension::Lines => self.lines = value,
            MetricDimension::Statements => self.statements = value,
            MetricDimension::Functions => self.functions = value,
            MetricDimension::Branches => self.branches = value,
        }
    }

    /// Per-dimension minimum of two metrics. A dimension absent or non-finite
    /// on either side is absent in the result, so the combination can never
    /// look healthier than its weakest contributor.
    pub fn min_with(&self, other: &CoverageMetric) -> CoverageMetric {
        let mut combined = CoverageMetric::default();
        for dimension in MetricDimension::ORDER {
            let value = match (self.get(dimension), other.get(dimension)) {
                (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some(a.min(b)),
                _ => None,
            };
            combined.set(dimension, value);
        }
        combined
    }
}

/// The four gated coverage dimensions, in fixed comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDimension {
    Lines,
    Statements,
    Functions,
    Branches,
}

impl MetricDimension {
    /// Comparison order: lines, statements, functions, branches. The first
    /// failing dimension in this order is the one surfaced first.
    pub const ORDER: [MetricDimension; 4] = [
        MetricDimension::Lines,
        MetricDimension::Statements,
        MetricDimension::Functions,
        MetricDimension::Branches,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lines => "lines",
            Self::Statements => "statements",
            Self::Functions => "functions",
            Self::Branches => "branches",
        }
    }
}

impl std::fmt::Display for MetricDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized coverage for one workspace: aggregate metric plus an optional
/// per-file breakdown (`None` when the artifact only exposes totals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageTotals {
    /// Aggregate percentages, flattened into the record so consumers read
    /// `lines`/`statements`/... directly.
    #[serde(flatten)]
    pub metric: CoverageMetric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_file: Option<std::collections::BTreeMap<String, CoverageMetric>>,
}

/// Uncovered source lines for one file of one workspace; `lines` is
/// ascending and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncoveredLinesEntry {
    pub workspace: String,
    pub file: String,
    pub lines: Vec<u32>,
}

/// Coverage thresholds, one per dimension; the gate requires `>=` per
/// dimension. Defaults to 100 everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_threshold")]
    pub lines: f64,
    #[serde(default = "default_threshold")]
    pub statements: f64,
    #[serde(default = "default_threshold")]
    pub functions: f64,
    #[serde(default = "default_threshold")]
    pub branches: f64,
}

fn default_threshold() -> f64 {
    100.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::uniform(100.0)
    }
}

impl Thresholds {
    pub fn uniform(pct: f64) -> Self {
        Self {
            lines: pct,
            statements: pct,
            functions: pct,
            branches: pct,
        }
    }

    pub fn get(&self, dimension: MetricDimension) -> f64 {
        match dimension {
            MetricDimension::Lines => self.lines,
            MetricDimension::Statements => self.statements,
            MetricDimension::Functions => self.functions,
            MetricDimension::Branches => self.branches,
        }
    }
}

/// Persisted branch row, as handed over by the external store. Field names
/// match the storage columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchRecord {
    pub name: String,
    /// JSON array of staged file entries (bare strings or `{path}` objects).
    #[serde(default)]
    pub staged_files: serde_json::Value,
    #[serde(default)]
    pub is_current: bool,
}

/// Minimal project handle: an id for diagnostics plus the filesystem root.
/// A missing path is the fatal `NoProjectPath` precondition.
#[derive(Debug, Clone)]
pub struct ProjectRef {
    pub id: String,
    pub path: Option<PathBuf>,
}

impl ProjectRef {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: Some(path.into()),
        }
    }

    pub fn without_path(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
        }
    }
}

/// Per-call options for a test run. Deserializes from the camelCase shape
/// the original API consumers send.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunOptions {
    /// Bypass simulation and actually dispatch workspace jobs.
    #[serde(default)]
    pub real: bool,
    /// Explicit changed-file list; takes precedence over git and the
    /// persisted staged files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_files: Option<Vec<String>>,
    /// Alias for `changed_files`; both are merged when given together.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_thresholds: Option<Thresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_file_coverage_thresholds: Option<Thresholds>,
    /// Overrides the configured enforcement flag when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_changed_file_coverage: Option<bool>,
    /// Capture uncovered lines for every resolvable file, not only changed
    /// ones.
    #[serde(default)]
    pub include_coverage_line_refs: bool,
}

/// Join a workspace-relative artifact path onto a project root.
pub fn project_path(root: &Path, relative: &str) -> PathBuf {
    if relative.is_empty() || relative == "." {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_kebab_case() {
        assert_eq!(WorkspaceKind::RootNode.as_str(), "root-node");
        assert_eq!(WorkspaceKind::FrontendNode.as_str(), "frontend-node");
        assert_eq!(WorkspaceKind::BackendNode.as_str(), "backend-node");
        assert_eq!(WorkspaceKind::BackendPython.as_str(), "backend-python");
    }

    #[test]
    fn test_kind_serde_round_trip() {
        let json = serde_json::to_string(&WorkspaceKind::BackendPython).unwrap();
        assert_eq!(json, "\"backend-python\"");
        let parsed: WorkspaceKind = serde_json::from_str("\"frontend-node\"").unwrap();
        assert_eq!(parsed, WorkspaceKind::FrontendNode);
    }

    #[test]
    fn test_stable_rank_order() {
        let mut kinds = vec![
            WorkspaceKind::BackendPython,
            WorkspaceKind::FrontendNode,
            WorkspaceKind::RootNode,
            WorkspaceKind::BackendNode,
        ];
        kinds.sort_by_key(|k| k.rank());
        assert_eq!(
            kinds,
            vec![
                WorkspaceKind::RootNode,
                WorkspaceKind::FrontendNode,
                WorkspaceKind::BackendNode,
                WorkspaceKind::BackendPython,
            ]
        );
    }

    #[test]
    fn test_workspace_artifact_paths() {
        let ws = Workspace {
            kind: WorkspaceKind::FrontendNode,
            directory: PathBuf::from("/proj/frontend"),
            test_command: None,
        };
        assert_eq!(
            ws.coverage_summary_path().unwrap(),
            PathBuf::from("/proj/frontend/coverage/coverage-summary.json")
        );
        assert_eq!(
            ws.coverage_final_path().unwrap(),
            PathBuf::from("/proj/frontend/coverage/coverage-final.json")
        );
        assert!(ws.python_coverage_path().is_none());
    }

    #[test]
    fn test_python_workspace_has_no_node_artifacts() {
        let ws = Workspace {
            kind: WorkspaceKind::BackendPython,
            directory: PathBuf::from("/proj/backend"),
            test_command: None,
        };
        assert!(ws.coverage_summary_path().is_none());
        assert_eq!(
            ws.python_coverage_path().unwrap(),
            PathBuf::from("/proj/backend/coverage.json")
        );
    }

    #[test]
    fn test_metric_absent_fields_skipped_in_json() {
        let metric = CoverageMetric {
            lines: Some(99.0),
            ..Default::default()
        };
        let json = serde_json::to_string(&metric).unwrap();
        assert_eq!(json, r#"{"lines":99.0}"#);
    }

    #[test]
    fn test_metric_min_with_takes_weakest_dimension() {
        let a = CoverageMetric {
            lines: Some(90.0),
            statements: Some(80.0),
            functions: Some(100.0),
            branches: None,
        };
        let b = CoverageMetric {
            lines: Some(85.0),
            statements: Some(95.0),
            functions: Some(100.0),
            branches: Some(70.0),
        };
        let min = a.min_with(&b);
        assert_eq!(min.lines, Some(85.0));
        assert_eq!(min.statements, Some(80.0));
        assert_eq!(min.functions, Some(100.0));
        // Absent on either side stays absent.
        assert_eq!(min.branches, None);
    }

    #[test]
    fn test_metric_min_with_drops_non_finite() {
        let a = CoverageMetric::uniform(100.0);
        let b = CoverageMetric {
            lines: Some(f64::NAN),
            ..CoverageMetric::uniform(100.0)
        };
        let min = a.min_with(&b);
        assert_eq!(min.lines, None);
        assert_eq!(min.statements, Some(100.0));
    }

    #[test]
    fn test_totals_flatten_metric_into_record() {
        let totals = CoverageTotals {
            metric: CoverageMetric::uniform(100.0),
            per_file: None,
        };
        let value = serde_json::to_value(&totals).unwrap();
        assert_eq!(value["lines"], serde_json::json!(100.0));
        assert!(value.get("metric").is_none());
        assert!(value.get("perFile").is_none());
    }

    #[test]
    fn test_thresholds_default_to_100() {
        let t = Thresholds::default();
        for dimension in MetricDimension::ORDER {
            assert_eq!(t.get(dimension), 100.0);
        }
    }

    #[test]
    fn test_thresholds_partial_json_fills_defaults() {
        let t: Thresholds = serde_json::from_str(r#"{"lines": 90}"#).unwrap();
        assert_eq!(t.lines, 90.0);
        assert_eq!(t.statements, 100.0);
        assert_eq!(t.branches, 100.0);
    }

    #[test]
    fn test_dimension_order_is_lines_first() {
        let names: Vec<&str> = MetricDimension::ORDER.iter().map(|d| d.as_str()).collect();
        assert_eq!(names, vec!["lines", "statements", "functions", "branches"]);
    }

    #[test]
    fn test_options_parse_camel_case() {
        let json = r#"{
            "real": true,
            "changedFiles": ["frontend/src/App.jsx"],
            "coverageThresholds": {"lines": 90},
            "enforceChangedFileCoverage": true,
            "includeCoverageLineRefs": true
        }"#;
        let options: TestRunOptions = serde_json::from_str(json).unwrap();
        assert!(options.real);
        assert_eq!(
            options.changed_files.as_deref(),
            Some(&["frontend/src/App.jsx".to_string()][..])
        );
        assert_eq!(options.coverage_thresholds.unwrap().lines, 90.0);
        assert_eq!(options.enforce_changed_file_coverage, Some(true));
        assert!(options.include_coverage_line_refs);
    }

    #[test]
    fn test_options_default_is_simulated() {
        let options = TestRunOptions::default();
        assert!(!options.real);
        assert!(options.changed_files.is_none());
        assert!(options.enforce_changed_file_coverage.is_none());
    }

    #[test]
    fn test_branch_record_parses_storage_row() {
        let json = r#"{
            "name": "feature-x",
            "staged_files": ["frontend/src/a.js", {"path": "backend/app.py"}],
            "is_current": true
        }"#;
        let record: BranchRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name, "feature-x");
        assert!(record.is_current);
        assert!(record.staged_files.is_array());
    }

    #[test]
    fn test_test_command_display() {
        let cmd = TestCommand::new("npm", &["test", "--", "--coverage"]);
        assert_eq!(cmd.to_string(), "npm test -- --coverage");
    }
}
