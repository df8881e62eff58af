//! Local process-backed job runner.
//!
//! Each job runs the workspace's test command as a child process. Jobs start
//! immediately on a background task, so concurrent workspace dispatch
//! overlaps process execution; waiting joins the task and hands back the
//! captured output.

use async_trait::async_trait;
use covgate_common::{Job, JobCompletion, JobRunner, JobSpec, JobStatus, LogLine};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct ProcessJobRunner {
    jobs: Mutex<HashMap<String, JoinHandle<JobCompletion>>>,
}

impl ProcessJobRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRunner for ProcessJobRunner {
    async fn start_job(&self, spec: JobSpec) -> anyhow::Result<Job> {
        let id = Uuid::new_v4().to_string();
        debug!(
            "job {}: {} {} (cwd {})",
            id,
            spec.command,
            spec.args.join(" "),
            spec.cwd.display()
        );
        let handle = tokio::spawn(run_process(spec));
        self.jobs.lock().await.insert(id.clone(), handle);
        Ok(Job { id })
    }

    async fn wait_for_completion(&self, job_id: &str) -> anyhow::Result<Option<JobCompletion>> {
        let handle = self.jobs.lock().await.remove(job_id);
        match handle {
            // A panicked job task reports as a lost completion, not an error.
            Some(handle) => Ok(handle.await.ok()),
            None => Ok(None),
        }
    }
}

async fn run_process(spec: JobSpec) -> JobCompletion {
    let output = Command::new(&spec.command)
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) => {
            let mut logs = Vec::new();
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                logs.push(LogLine::stdout(line));
            }
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                logs.push(LogLine::stderr(line));
            }
            let status = if output.status.success() {
                JobStatus::Succeeded
            } else {
                JobStatus::Failed
            };
            JobCompletion {
                status,
                exit_code: output.status.code(),
                logs,
            }
        }
        Err(err) => JobCompletion {
            status: JobStatus::Failed,
            exit_code: None,
            logs: vec![LogLine::system(format!(
                "failed to spawn {}: {}",
                spec.command, err
            ))],
        },
    }
}
