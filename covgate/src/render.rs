//! Terminal rendering of gate results.

use colored::Colorize;
use covgate_common::{
    ChangedFileGateResult, CoverageMetric, MetricDimension, RunStatus, TestRunResult, Thresholds,
    Workspace, WorkspaceRun,
};
use std::time::Duration;

pub fn format_pct(value: Option<f64>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{:.1}%", value),
        _ => "n/a".to_string(),
    }
}

/// One cell per dimension, value against threshold, red when short.
fn metric_cells(metric: &CoverageMetric, thresholds: &Thresholds) -> String {
    MetricDimension::ORDER
        .iter()
        .map(|&dimension| {
            let value = metric.get(dimension);
            let cell = format!(
                "{} {}/{:.0}%",
                dimension.as_str(),
                format_pct(value),
                thresholds.get(dimension)
            );
            let passed =
                matches!(value, Some(v) if v.is_finite() && v >= thresholds.get(dimension));
            if passed {
                cell.green().to_string()
            } else {
                cell.red().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn status_cell(status: RunStatus) -> String {
    let text = status.as_str();
    match status {
        RunStatus::Succeeded => text.green().to_string(),
        RunStatus::Simulated => text.cyan().to_string(),
        RunStatus::Failed => text.red().to_string(),
        RunStatus::Cancelled | RunStatus::Unknown => text.yellow().to_string(),
    }
}

fn workspace_line(run: &WorkspaceRun) -> String {
    let exit = match run.exit_code {
        Some(code) => format!(" (exit {})", code),
        None => String::new(),
    };
    format!("{:<16} {}{}", run.workspace, status_cell(run.status), exit)
}

/// Changed-file totals row, judged against the changed-file threshold set
/// rather than the aggregate one. `None` when no changed file resolved.
fn changed_files_line(changed: &ChangedFileGateResult) -> Option<String> {
    let totals = changed.totals.as_ref()?;
    let header = if changed.passed {
        "changed files:".normal()
    } else {
        "changed files:".red()
    };
    Some(format!(
        "{} {}",
        header,
        metric_cells(totals, &changed.thresholds)
    ))
}

pub fn print_result(result: &TestRunResult, elapsed: Duration) {
    let verdict = if result.success {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    println!("{} ({})", verdict, result.status.as_str());

    for run in &result.workspace_runs {
        println!("  {}", workspace_line(run));
    }

    let coverage = &result.summary.coverage;
    if let Some(totals) = &coverage.totals {
        println!("  coverage: {}", metric_cells(totals, &coverage.thresholds));
    }
    if !coverage.missing.is_empty() {
        println!(
            "  {} {}",
            "missing coverage:".red(),
            coverage.missing.join(", ")
        );
    }
    if !coverage.changed_files.missing.is_empty() {
        println!(
            "  {} {}",
            "changed files without coverage:".red(),
            coverage.changed_files.missing.join(", ")
        );
    }
    if let Some(line) = changed_files_line(&coverage.changed_files) {
        println!("  {}", line);
    }
    if let Some(entries) = &coverage.uncovered_lines {
        for entry in entries.iter().take(10) {
            println!(
                "  {} {}/{}: {}",
                "uncovered".yellow(),
                entry.workspace,
                entry.file,
                entry
                    .lines
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            );
        }
        if entries.len() > 10 {
            println!("  ... and {} more file(s)", entries.len() - 10);
        }
    }
    if let Some(error) = &result.error {
        println!("  {}", error.red());
    }

    let rounded = Duration::from_millis(elapsed.as_millis() as u64);
    println!("  finished in {}", humantime::format_duration(rounded));
}

pub fn print_workspaces(workspaces: &[Workspace]) {
    for workspace in workspaces {
        let command = workspace
            .test_command
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<16} {}  [{}]",
            workspace.name(),
            workspace.kind.as_str(),
            workspace.directory.display(),
            command
        );
    }
}
