//! Scripted collaborator doubles for tests.
//!
//! Shipped as a regular module so integration tests and downstream consumers
//! can drive the orchestrator without processes or a git checkout. Both
//! doubles are deterministic: unscripted git calls report exit 128,
//! unscripted jobs are "lost" (no completion).

use crate::git::{GitOutput, GitRunner};
use crate::runner::{Job, JobCompletion, JobRunner, JobSpec, JobStatus, LogLine};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Git double with canned responses keyed by the full argument list.
#[derive(Debug, Default)]
pub struct StaticGit {
    responses: HashMap<String, GitOutput>,
    fail_all: bool,
}

impl StaticGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call errors, as when the binary is missing entirely.
    pub fn not_ready() -> Self {
        Self {
            responses: HashMap::new(),
            fail_all: true,
        }
    }

    /// Script the output for one exact argument list.
    pub fn respond(mut self, args: &[&str], output: GitOutput) -> Self {
        self.responses.insert(args.join(" "), output);
        self
    }
}

#[async_trait]
impl GitRunner for StaticGit {
    async fn run(&self, _cwd: &Path, args: &[&str]) -> anyhow::Result<GitOutput> {
        if self.fail_all {
            anyhow::bail!("git unavailable");
        }
        let key = args.join(" ");
        Ok(self.responses.get(&key).cloned().unwrap_or_else(|| {
            GitOutput::failed(128, format!("fatal: no scripted response for `git {}`", key))
        }))
    }
}

/// Job-runner double: completions are scripted per working directory, and
/// every started spec is recorded for assertions.
#[derive(Debug, Default)]
pub struct MockJobRunner {
    completions: HashMap<PathBuf, JobCompletion>,
    started: Mutex<Vec<JobSpec>>,
    jobs: Mutex<HashMap<String, PathBuf>>,
    next_id: AtomicUsize,
}

impl MockJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the completion for jobs started in `cwd`.
    pub fn complete_in(mut self, cwd: impl Into<PathBuf>, completion: JobCompletion) -> Self {
        self.completions.insert(cwd.into(), completion);
        self
    }

    /// Script a clean success in `cwd`.
    pub fn succeed_in(self, cwd: impl Into<PathBuf>) -> Self {
        self.complete_in(
            cwd,
            JobCompletion {
                status: JobStatus::Succeeded,
                exit_code: Some(0),
                logs: vec![LogLine::stdout("tests passed")],
            },
        )
    }

    /// Script a failing run in `cwd`.
    pub fn fail_in(self, cwd: impl Into<PathBuf>, exit_code: i32) -> Self {
        self.complete_in(
            cwd,
            JobCompletion {
                status: JobStatus::Failed,
                exit_code: Some(exit_code),
                logs: vec![LogLine::stderr("tests failed")],
            },
        )
    }

    /// Every spec passed to `start_job`, in dispatch order.
    pub fn started(&self) -> Vec<JobSpec> {
        lock(&self.started).clone()
    }
}

#[async_trait]
impl JobRunner for MockJobRunner {
    async fn start_job(&self, spec: JobSpec) -> anyhow::Result<Job> {
        let id = format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.jobs).insert(id.clone(), spec.cwd.clone());
        lock(&self.started).push(spec);
        Ok(Job { id })
    }

    async fn wait_for_completion(&self, job_id: &str) -> anyhow::Result<Option<JobCompletion>> {
        let cwd = lock(&self.jobs).get(job_id).cloned();
        Ok(cwd.and_then(|cwd| self.completions.get(&cwd).cloned()))
    }
}
