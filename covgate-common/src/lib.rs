//! Shared core of the covgate per-branch test-and-coverage gate.
//!
//! The pipeline runs in one direction: workspace detection, job dispatch,
//! artifact parsing, changed-path resolution, gate evaluation. Everything
//! with side effects funnels through two injected collaborators
//! ([`JobRunner`] and [`GitRunner`]); the parsing and gating layers are pure
//! functions over explicit inputs.

pub mod changed;
pub mod config;
pub mod coverage;
pub mod detect;
pub mod errors;
pub mod gate;
pub mod git;
pub mod orchestrator;
pub mod paths;
pub mod runner;
pub mod testing;
pub mod types;

pub use changed::{ChangedFile, ChangedPathResolution, ChangedSource, resolve_changed_paths};
pub use config::{ConfigError, DEFAULT_BASE_BRANCH, GateConfig};
pub use coverage::{
    extract_all_uncovered_lines, extract_uncovered_lines, parse_node_summary,
    parse_python_coverage,
};
pub use detect::detect_workspaces;
pub use errors::GateError;
pub use gate::{
    ChangedFileGateResult, ChangedFileSkipReason, CoverageGateResult, GateEvaluation,
    WorkspaceChangedFiles, WorkspaceChangedInput, evaluate_changed_files, evaluate_totals,
};
pub use git::{GitOutput, GitRunner};
pub use orchestrator::{RunSummary, TestOrchestrator, TestRunResult, TestRunStatus};
pub use runner::{
    Job, JobCompletion, JobRunner, JobSpec, JobStatus, LogLine, LogStream, RunStatus,
    WorkspaceCoverage, WorkspaceRun,
};
pub use types::{
    BranchRecord, CoverageMetric, CoverageTotals, MetricDimension, ProjectRef, TestCommand,
    TestRunOptions, Thresholds, UncoveredLinesEntry, Workspace, WorkspaceKind,
};
