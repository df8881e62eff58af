//! Job execution seam and per-workspace run model.
//!
//! The orchestrator never spawns processes itself; it hands a [`JobSpec`] to
//! a [`JobRunner`] and later asks for the completion. Anything can sit behind
//! the trait: a local process runner, a remote execution service, or the
//! scripted runner used in tests.

use crate::types::{CoverageTotals, WorkspaceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A test job to start: one command in one workspace directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Handle for a started job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
}

/// Terminal state reported by the runner backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// What a finished job left behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub logs: Vec<LogLine>,
}

/// Executes test jobs. Implementations must be safe to share across
/// concurrent workspace dispatches.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Start a job and return its handle.
    async fn start_job(&self, spec: JobSpec) -> anyhow::Result<Job>;

    /// Wait until the job reaches a terminal state. `Ok(None)` means the
    /// backend lost track of the job; the run is then recorded as unknown.
    async fn wait_for_completion(&self, job_id: &str) -> anyhow::Result<Option<JobCompletion>>;
}

/// Outcome of one workspace's test run, as recorded in the result document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
    Unknown,
    Simulated,
}

impl RunStatus {
    /// Whether this run counts toward overall success. Unknown never passes.
    pub fn passed(self) -> bool {
        matches!(self, Self::Succeeded | Self::Simulated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
            Self::Simulated => "simulated",
        }
    }
}

/// Map a runner completion to a run status. A non-zero exit code always
/// means failure, even when the backend claims success; a missing completion
/// is unknown.
pub fn classify_completion(completion: Option<&JobCompletion>) -> RunStatus {
    let Some(completion) = completion else {
        return RunStatus::Unknown;
    };
    if matches!(completion.exit_code, Some(code) if code != 0) {
        return RunStatus::Failed;
    }
    match completion.status {
        JobStatus::Succeeded => RunStatus::Succeeded,
        JobStatus::Failed => RunStatus::Failed,
        JobStatus::Cancelled => RunStatus::Cancelled,
    }
}

/// Which channel a captured log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
    System,
}

/// One captured output line with its arrival time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub stream: LogStream,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogLine {
    pub fn new(stream: LogStream, message: impl Into<String>) -> Self {
        Self {
            stream,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn stdout(message: impl Into<String>) -> Self {
        Self::new(LogStream::Stdout, message)
    }

    pub fn stderr(message: impl Into<String>) -> Self {
        Self::new(LogStream::Stderr, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(LogStream::System, message)
    }
}

/// Coverage attached to a workspace run: parsed Node totals, or the raw
/// Python payload carried verbatim. `Raw` is tried first when deserializing
/// untagged; a totals object never carries a top-level `raw` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkspaceCoverage {
    Raw { raw: serde_json::Value },
    Totals(CoverageTotals),
}

impl WorkspaceCoverage {
    /// Parsed totals, when this is Node-style coverage.
    pub fn totals(&self) -> Option<&CoverageTotals> {
        match self {
            Self::Totals(totals) => Some(totals),
            Self::Raw { .. } => None,
        }
    }
}

/// Full record of one workspace's run inside a test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRun {
    pub workspace: String,
    pub kind: WorkspaceKind,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub logs: Vec<LogLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<WorkspaceCoverage>,
}
