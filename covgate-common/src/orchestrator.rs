//! Branch test orchestration.
//!
//! One entry point, [`TestOrchestrator::run_tests_for_branch`], drives the
//! whole pipeline: detect workspaces, dispatch one test job per workspace,
//! parse coverage artifacts, resolve changed paths, and evaluate the gates.
//! Only the two structural preconditions (no workspace, no project path) are
//! errors; everything else, including failing jobs and malformed artifacts,
//! lands in the structured [`TestRunResult`].

use crate::changed::{ChangedPathResolution, resolve_changed_paths};
use crate::config::GateConfig;
use crate::coverage::{
    extract_all_uncovered_lines, extract_uncovered_lines, parse_node_summary,
    parse_python_coverage,
};
use crate::detect::detect_workspaces;
use crate::errors::GateError;
use crate::gate::{
    CoverageGateResult, GateEvaluation, WorkspaceChangedInput, evaluate_changed_files,
    evaluate_totals,
};
use crate::git::{GitRunner, current_branch};
use crate::runner::{
    JobCompletion, JobRunner, JobSpec, LogLine, RunStatus, WorkspaceCoverage, WorkspaceRun,
    classify_completion,
};
use crate::types::{
    BranchRecord, CoverageMetric, CoverageTotals, ProjectRef, TestRunOptions, UncoveredLinesEntry,
    Workspace,
};
use anyhow::Context;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Overall verdict of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestRunStatus {
    Passed,
    Failed,
}

impl TestRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Summary section of a run result; today that is the coverage gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub coverage: CoverageGateResult,
}

/// The full result document for one orchestrated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunResult {
    pub status: TestRunStatus,
    pub success: bool,
    pub workspace_runs: Vec<WorkspaceRun>,
    pub summary: RunSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sequences detection, job dispatch, artifact parsing, and gating for one
/// branch. Holds no state between calls; re-running re-reads everything.
pub struct TestOrchestrator {
    runner: Arc<dyn JobRunner>,
    git: Arc<dyn GitRunner>,
    config: GateConfig,
}

impl TestOrchestrator {
    pub fn new(runner: Arc<dyn JobRunner>, git: Arc<dyn GitRunner>, config: GateConfig) -> Self {
        Self {
            runner,
            git,
            config,
        }
    }

    /// Run the gate for one branch of one project.
    ///
    /// `branch` is the branch name when the caller knows it; `record` is the
    /// persisted branch row, used for its staged files and as a name
    /// fallback. Fails only with [`GateError::NoProjectPath`] or
    /// [`GateError::NoTestableWorkspace`]; job failures and coverage
    /// shortfalls are reported inside the result.
    pub async fn run_tests_for_branch(
        &self,
        project: &ProjectRef,
        branch: Option<&str>,
        record: Option<&BranchRecord>,
        options: &TestRunOptions,
    ) -> Result<TestRunResult, GateError> {
        let Some(root) = project.path.as_deref() else {
            return Err(GateError::NoProjectPath {
                project_id: project.id.clone(),
            });
        };

        let workspaces = detect_workspaces(root)?;
        let display_name = self.branch_display_name(root, branch, record).await;
        info!(
            "running tests for branch {} of project {} ({} workspace(s), {})",
            display_name,
            project.id,
            workspaces.len(),
            if options.real { "real" } else { "simulated" }
        );

        let mut runs = if options.real {
            let futures: Vec<_> = workspaces
                .iter()
                .map(|workspace| self.run_workspace(workspace))
                .collect();
            join_all(futures).await
        } else {
            workspaces.iter().map(simulate_workspace).collect()
        };

        if options.real {
            attach_coverage(&workspaces, &mut runs);
        }
        let missing = missing_coverage(&runs);
        let totals = combined_totals(&runs);

        let diff_head = head_ref(branch, record);
        let resolution = resolve_changed_paths(
            &*self.git,
            root,
            &self.config.base_branch,
            &diff_head,
            options,
            record,
            &self.config.source_extensions,
            &workspaces,
        )
        .await;

        let uncovered_lines =
            collect_uncovered_lines(&workspaces, &resolution, options.include_coverage_line_refs);

        let thresholds = self.config.thresholds_for(options);
        let changed_thresholds = self.config.changed_thresholds_for(options);
        let enforce = self.config.enforce_changed_for(options);

        let changed_inputs: Vec<WorkspaceChangedInput<'_>> = workspaces
            .iter()
            .zip(runs.iter())
            .map(|(workspace, run)| WorkspaceChangedInput {
                workspace: run.workspace.as_str(),
                files: resolution.files_for(workspace.kind),
                per_file: run
                    .coverage
                    .as_ref()
                    .and_then(WorkspaceCoverage::totals)
                    .and_then(|t| t.per_file.as_ref()),
            })
            .collect();
        let changed_files = evaluate_changed_files(&changed_inputs, &changed_thresholds, enforce);

        // The aggregate gate only applies when a Node workspace exists;
        // Python coverage never feeds it.
        let has_node = workspaces.iter().any(|w| w.kind.is_node());
        let aggregate = evaluate_totals(totals.as_ref(), &thresholds);
        let aggregate_passed = !has_node || aggregate.passed;
        let gate_passed = aggregate_passed && missing.is_empty() && changed_files.passed;

        let coverage = CoverageGateResult {
            passed: gate_passed,
            missing,
            totals,
            thresholds,
            uncovered_lines,
            changed_files,
        };

        let runs_passed = runs.iter().all(|run| run.status.passed());
        let success = runs_passed && gate_passed;
        let error = failure_message(&display_name, runs_passed, &coverage, &aggregate, has_node);
        let status = if success {
            TestRunStatus::Passed
        } else {
            TestRunStatus::Failed
        };
        info!(
            "branch {} gate {}: runs {}, coverage {}",
            display_name,
            status.as_str(),
            if runs_passed { "passed" } else { "failed" },
            if gate_passed { "passed" } else { "failed" }
        );

        Ok(TestRunResult {
            status,
            success,
            workspace_runs: runs,
            summary: RunSummary { coverage },
            error,
        })
    }

    /// Dispatch one workspace's test job and wait for it. Runner failures
    /// degrade to an unknown-status run with a system log line.
    async fn run_workspace(&self, workspace: &Workspace) -> WorkspaceRun {
        let name = workspace.name().to_string();
        let Some(command) = &workspace.test_command else {
            return WorkspaceRun {
                workspace: name,
                kind: workspace.kind,
                status: RunStatus::Unknown,
                exit_code: None,
                logs: vec![LogLine::system("no test command resolved")],
                coverage: None,
            };
        };

        debug!(
            "starting {} in {} for workspace {}",
            command,
            workspace.directory.display(),
            name
        );
        let spec = JobSpec {
            command: command.program.clone(),
            args: command.args.clone(),
            cwd: workspace.directory.clone(),
        };
        let (status, exit_code, logs) = match self.start_and_wait(spec).await {
            Ok(completion) => {
                let status = classify_completion(completion.as_ref());
                match completion {
                    Some(completion) => (status, completion.exit_code, completion.logs),
                    None => (
                        status,
                        None,
                        vec![LogLine::system("job completion unavailable")],
                    ),
                }
            }
            Err(err) => {
                warn!("workspace {} job failed to run: {:#}", name, err);
                (
                    RunStatus::Unknown,
                    None,
                    vec![LogLine::system(format!("job runner error: {:#}", err))],
                )
            }
        };

        WorkspaceRun {
            workspace: name,
            kind: workspace.kind,
            status,
            exit_code,
            logs,
            coverage: None,
        }
    }

    async fn start_and_wait(&self, spec: JobSpec) -> anyhow::Result<Option<JobCompletion>> {
        let job = self
            .runner
            .start_job(spec)
            .await
            .context("failed to start test job")?;
        self.runner
            .wait_for_completion(&job.id)
            .await
            .context("failed waiting for test job completion")
    }

    /// Branch name for messages: explicit argument, then the record's name,
    /// then the checked-out branch, then a placeholder.
    async fn branch_display_name(
        &self,
        root: &std::path::Path,
        branch: Option<&str>,
        record: Option<&BranchRecord>,
    ) -> String {
        if let Some(name) = branch.map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(name) = record.map(|r| r.name.trim()).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(name) = current_branch(&*self.git, root).await {
            return name;
        }
        "(current)".to_string()
    }
}

/// Git ref to diff against the base branch: explicit branch, record name,
/// then `HEAD`.
fn head_ref(branch: Option<&str>, record: Option<&BranchRecord>) -> String {
    if let Some(name) = branch.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if let Some(name) = record.map(|r| r.name.trim()).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    "HEAD".to_string()
}

/// Simulated run: no job is dispatched, Node workspaces report full
/// aggregate coverage without per-file data, Python reports none.
fn simulate_workspace(workspace: &Workspace) -> WorkspaceRun {
    let coverage = workspace.kind.is_node().then(|| {
        WorkspaceCoverage::Totals(CoverageTotals {
            metric: CoverageMetric::uniform(100.0),
            per_file: None,
        })
    });
    WorkspaceRun {
        workspace: workspace.name().to_string(),
        kind: workspace.kind,
        status: RunStatus::Simulated,
        exit_code: None,
        logs: vec![LogLine::system("simulated run; tests were not executed")],
        coverage,
    }
}

/// Read each workspace's coverage artifact and attach it to its run.
fn attach_coverage(workspaces: &[Workspace], runs: &mut [WorkspaceRun]) {
    for (workspace, run) in workspaces.iter().zip(runs.iter_mut()) {
        if workspace.kind.is_node() {
            run.coverage = workspace
                .coverage_summary_path()
                .and_then(|path| parse_node_summary(&path))
                .map(WorkspaceCoverage::Totals);
        } else if let Some(path) = workspace.python_coverage_path() {
            run.coverage = parse_python_coverage(&path).map(|raw| WorkspaceCoverage::Raw { raw });
        }
    }
}

/// Node workspaces whose coverage artifact was absent or unparseable.
/// A Python workspace without `coverage.json` is never reported missing.
fn missing_coverage(runs: &[WorkspaceRun]) -> Vec<String> {
    runs.iter()
        .filter(|run| {
            run.kind.is_node()
                && run
                    .coverage
                    .as_ref()
                    .and_then(WorkspaceCoverage::totals)
                    .is_none()
        })
        .map(|run| run.workspace.clone())
        .collect()
}

/// Per-dimension minimum across every workspace that produced Node totals.
fn combined_totals(runs: &[WorkspaceRun]) -> Option<CoverageMetric> {
    let mut combined: Option<CoverageMetric> = None;
    for run in runs {
        if let Some(totals) = run.coverage.as_ref().and_then(WorkspaceCoverage::totals) {
            combined = Some(match combined {
                Some(current) => current.min_with(&totals.metric),
                None => totals.metric,
            });
        }
    }
    combined
}

/// Gather uncovered lines across Node workspaces, from the changed files or
/// from every resolvable file when `include_all` is set. `None` when no
/// workspace could report anything.
fn collect_uncovered_lines(
    workspaces: &[Workspace],
    resolution: &ChangedPathResolution,
    include_all: bool,
) -> Option<Vec<UncoveredLinesEntry>> {
    let mut entries = Vec::new();
    let mut any = false;
    for workspace in workspaces {
        let Some(final_path) = workspace.coverage_final_path() else {
            continue;
        };
        let extracted = if include_all {
            extract_all_uncovered_lines(&final_path, workspace.name())
        } else {
            let targets: Vec<String> = resolution
                .files_for(workspace.kind)
                .iter()
                .map(|file| file.relative.clone())
                .collect();
            if targets.is_empty() {
                None
            } else {
                extract_uncovered_lines(&final_path, workspace.name(), &targets)
            }
        };
        if let Some(mut list) = extracted {
            any = true;
            entries.append(&mut list);
        }
    }
    any.then_some(entries)
}

/// One-line failure explanation, tiered: failing tests, then missing
/// workspace coverage, then aggregate threshold misses, then the
/// changed-file gate.
fn failure_message(
    display_name: &str,
    runs_passed: bool,
    coverage: &CoverageGateResult,
    aggregate: &GateEvaluation,
    has_node: bool,
) -> Option<String> {
    if !runs_passed {
        return Some(format!("Branch {} has failing tests", display_name));
    }
    if !coverage.missing.is_empty() {
        return Some(format!(
            "Coverage missing for workspace(s): {}",
            coverage.missing.join(", ")
        ));
    }
    if has_node && !aggregate.passed {
        let dimensions: Vec<&str> = aggregate
            .missing_dimensions
            .iter()
            .map(|d| d.as_str())
            .collect();
        return Some(format!(
            "Coverage thresholds not met: {}",
            dimensions.join(", ")
        ));
    }
    if !coverage.changed_files.passed {
        return Some(if coverage.changed_files.missing.is_empty() {
            "Changed-file coverage thresholds not met".to_string()
        } else {
            format!(
                "Changed-file coverage missing for: {}",
                coverage.changed_files.missing.join(", ")
            )
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ChangedFileGateResult;
    use crate::types::{Thresholds, WorkspaceKind};
    use std::path::PathBuf;

    fn record(name: &str) -> BranchRecord {
        BranchRecord {
            name: name.to_string(),
            staged_files: serde_json::Value::Null,
            is_current: false,
        }
    }

    #[test]
    fn test_head_ref_prefers_explicit_branch() {
        assert_eq!(head_ref(Some("feature-x"), Some(&record("other"))), "feature-x");
        assert_eq!(head_ref(Some("  "), Some(&record("stored"))), "stored");
        assert_eq!(head_ref(None, None), "HEAD");
    }

    #[test]
    fn test_simulated_node_run_reports_full_coverage() {
        let run = simulate_workspace(&Workspace {
            kind: WorkspaceKind::FrontendNode,
            directory: PathBuf::from("/proj/frontend"),
            test_command: None,
        });
        assert_eq!(run.status, RunStatus::Simulated);
        let totals = run.coverage.as_ref().and_then(WorkspaceCoverage::totals);
        assert_eq!(totals.unwrap().metric, CoverageMetric::uniform(100.0));
        assert!(totals.unwrap().per_file.is_none());
    }

    #[test]
    fn test_simulated_python_run_has_no_coverage() {
        let run = simulate_workspace(&Workspace {
            kind: WorkspaceKind::BackendPython,
            directory: PathBuf::from("/proj/backend"),
            test_command: None,
        });
        assert_eq!(run.status, RunStatus::Simulated);
        assert!(run.coverage.is_none());
    }

    #[test]
    fn test_missing_coverage_ignores_python() {
        let runs = vec![
            WorkspaceRun {
                workspace: "frontend".to_string(),
                kind: WorkspaceKind::FrontendNode,
                status: RunStatus::Succeeded,
                exit_code: Some(0),
                logs: Vec::new(),
                coverage: None,
            },
            WorkspaceRun {
                workspace: "backend-python".to_string(),
                kind: WorkspaceKind::BackendPython,
                status: RunStatus::Succeeded,
                exit_code: Some(0),
                logs: Vec::new(),
                coverage: None,
            },
        ];
        assert_eq!(missing_coverage(&runs), vec!["frontend"]);
    }

    #[test]
    fn test_combined_totals_take_weakest_workspace() {
        let run = |name: &str, pct: f64| WorkspaceRun {
            workspace: name.to_string(),
            kind: WorkspaceKind::FrontendNode,
            status: RunStatus::Succeeded,
            exit_code: Some(0),
            logs: Vec::new(),
            coverage: Some(WorkspaceCoverage::Totals(CoverageTotals {
                metric: CoverageMetric::uniform(pct),
                per_file: None,
            })),
        };
        let totals = combined_totals(&[run("frontend", 97.0), run("backend", 92.5)]).unwrap();
        assert_eq!(totals, CoverageMetric::uniform(92.5));
    }

    #[test]
    fn test_failure_message_tiers() {
        let coverage = CoverageGateResult {
            passed: false,
            missing: vec!["frontend".to_string()],
            totals: None,
            thresholds: Thresholds::default(),
            uncovered_lines: None,
            changed_files: ChangedFileGateResult {
                passed: false,
                missing: vec!["frontend/src/gone.js".to_string()],
                totals: None,
                thresholds: Thresholds::default(),
                workspaces: Vec::new(),
            },
        };
        let aggregate = GateEvaluation {
            passed: false,
            missing_dimensions: vec![crate::types::MetricDimension::Lines],
        };

        // Failing tests dominate everything else.
        assert_eq!(
            failure_message("feature-x", false, &coverage, &aggregate, true).unwrap(),
            "Branch feature-x has failing tests"
        );
        // Then missing workspace coverage.
        assert_eq!(
            failure_message("feature-x", true, &coverage, &aggregate, true).unwrap(),
            "Coverage missing for workspace(s): frontend"
        );
        // Then threshold misses.
        let coverage_no_missing = CoverageGateResult {
            missing: Vec::new(),
            ..coverage.clone()
        };
        assert_eq!(
            failure_message("feature-x", true, &coverage_no_missing, &aggregate, true).unwrap(),
            "Coverage thresholds not met: lines"
        );
        // Then the changed-file gate.
        let aggregate_ok = GateEvaluation {
            passed: true,
            missing_dimensions: Vec::new(),
        };
        assert_eq!(
            failure_message("feature-x", true, &coverage_no_missing, &aggregate_ok, true).unwrap(),
            "Changed-file coverage missing for: frontend/src/gone.js"
        );
    }
}
