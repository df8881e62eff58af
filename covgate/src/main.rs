//! covgate - per-branch test and coverage gate.
//!
//! Detects the testable workspaces of a project, runs their coverage-
//! producing test commands, and evaluates aggregate and changed-file
//! coverage thresholds into a single pass/fail verdict.

#![forbid(unsafe_code)]

mod process_runner;
mod render;
mod system_git;

use anyhow::Context;
use clap::{Parser, Subcommand};
use covgate_common::{
    BranchRecord, GateConfig, ProjectRef, TestOrchestrator, TestRunOptions, Thresholds,
    detect_workspaces,
};
use process_runner::ProcessJobRunner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use system_git::SystemGit;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "covgate")]
#[command(author, version, about = "Per-branch test and coverage gate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a covgate.toml configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workspace tests and evaluate the coverage gate
    Run {
        /// Project root directory
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Branch under test (defaults to the checked-out branch)
        #[arg(short, long)]
        branch: Option<String>,

        /// Base branch to diff changed files against (overrides configuration)
        #[arg(long, value_name = "NAME")]
        base: Option<String>,

        /// Skip test execution and report a simulated run
        #[arg(long)]
        simulate: bool,

        /// Changed file to gate on (repeatable); overrides git detection
        #[arg(long = "changed-file", value_name = "PATH")]
        changed_files: Vec<String>,

        /// JSON file holding the persisted branch record (staged files)
        #[arg(long, value_name = "FILE")]
        branch_record: Option<PathBuf>,

        /// Minimum aggregate line coverage (overrides configuration)
        #[arg(long, value_name = "PCT")]
        min_lines: Option<f64>,

        /// Minimum aggregate statement coverage
        #[arg(long, value_name = "PCT")]
        min_statements: Option<f64>,

        /// Minimum aggregate function coverage
        #[arg(long, value_name = "PCT")]
        min_functions: Option<f64>,

        /// Minimum aggregate branch coverage
        #[arg(long, value_name = "PCT")]
        min_branches: Option<f64>,

        /// Minimum changed-file line coverage
        #[arg(long, value_name = "PCT")]
        changed_min_lines: Option<f64>,

        /// Minimum changed-file statement coverage
        #[arg(long, value_name = "PCT")]
        changed_min_statements: Option<f64>,

        /// Minimum changed-file function coverage
        #[arg(long, value_name = "PCT")]
        changed_min_functions: Option<f64>,

        /// Minimum changed-file branch coverage
        #[arg(long, value_name = "PCT")]
        changed_min_branches: Option<f64>,

        /// Enforce the changed-file coverage gate for this run
        #[arg(long)]
        enforce_changed: bool,

        /// Capture uncovered lines for every resolvable file
        #[arg(long)]
        include_line_refs: bool,

        /// Print the full result document as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the testable workspaces detected under a project root
    Detect {
        /// Project root directory
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Print workspaces as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Human output goes to stdout; keep logs on stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Exit codes: 0 gate passed, 1 gate failed, 2 fatal error.
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(2);
        }
    }
}

fn resolve_root(project: &Path) -> anyhow::Result<PathBuf> {
    project
        .canonicalize()
        .with_context(|| format!("project root {} is not accessible", project.display()))
}

fn load_branch_record(path: &Path) -> anyhow::Result<BranchRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read branch record {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("branch record {} is not valid JSON", path.display()))
}

/// Overlay per-dimension flag overrides on a configured threshold set.
/// `None` when no flag was given, so the configured set stays authoritative.
fn override_thresholds(base: Thresholds, overrides: [Option<f64>; 4]) -> Option<Thresholds> {
    let [lines, statements, functions, branches] = overrides;
    if overrides.iter().all(Option::is_none) {
        return None;
    }
    Some(Thresholds {
        lines: lines.unwrap_or(base.lines),
        statements: statements.unwrap_or(base.statements),
        functions: functions.unwrap_or(base.functions),
        branches: branches.unwrap_or(base.branches),
    })
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Run {
            project,
            branch,
            base,
            simulate,
            changed_files,
            branch_record,
            min_lines,
            min_statements,
            min_functions,
            min_branches,
            changed_min_lines,
            changed_min_statements,
            changed_min_functions,
            changed_min_branches,
            enforce_changed,
            include_line_refs,
            json,
        } => {
            let mut config =
                GateConfig::load(cli.config.as_deref()).context("could not load configuration")?;
            if let Some(base) = base {
                config.base_branch = base;
            }
            let root = resolve_root(&project)?;
            let id = root
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string());
            let project_ref = ProjectRef::new(id, root);

            let record = branch_record.as_deref().map(load_branch_record).transpose()?;
            let options = TestRunOptions {
                real: !simulate,
                changed_files: (!changed_files.is_empty()).then_some(changed_files),
                coverage_thresholds: override_thresholds(
                    config.coverage_thresholds,
                    [min_lines, min_statements, min_functions, min_branches],
                ),
                changed_file_coverage_thresholds: override_thresholds(
                    config.changed_file_coverage_thresholds,
                    [
                        changed_min_lines,
                        changed_min_statements,
                        changed_min_functions,
                        changed_min_branches,
                    ],
                ),
                enforce_changed_file_coverage: enforce_changed.then_some(true),
                include_coverage_line_refs: include_line_refs,
                ..Default::default()
            };

            let orchestrator = TestOrchestrator::new(
                Arc::new(ProcessJobRunner::new()),
                Arc::new(SystemGit),
                config,
            );
            let started = Instant::now();
            let result = orchestrator
                .run_tests_for_branch(&project_ref, branch.as_deref(), record.as_ref(), &options)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                render::print_result(&result, started.elapsed());
            }
            Ok(if result.success { 0 } else { 1 })
        }

        Commands::Detect { project, json } => {
            let root = resolve_root(&project)?;
            let workspaces = detect_workspaces(&root)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&workspaces)?);
            } else {
                render::print_workspaces(&workspaces);
            }
            Ok(0)
        }
    }
}
