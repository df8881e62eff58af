//! Git collaborator seam.
//!
//! Changed-path resolution shells out to git through the [`GitRunner`]
//! trait. Every helper here degrades to "git not ready" (`false`/`None`) on
//! any failure: a project without a repository, a missing binary, or a bad
//! revision range must fall through to the next resolution source instead of
//! failing the run.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Captured output of one git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs git commands in a working directory. Implementations should report
/// command failure through the exit code, reserving `Err` for "could not run
/// git at all".
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, cwd: &Path, args: &[&str]) -> anyhow::Result<GitOutput>;
}

/// Whether `cwd` sits inside a git work tree.
pub async fn ensure_repository(git: &dyn GitRunner, cwd: &Path) -> bool {
    match git.run(cwd, &["rev-parse", "--is-inside-work-tree"]).await {
        Ok(output) => output.success() && output.stdout.trim() == "true",
        Err(err) => {
            debug!("git unavailable in {}: {}", cwd.display(), err);
            false
        }
    }
}

/// Current branch name, or `None` when git is unavailable or the head is
/// detached (git reports the literal `HEAD` then).
pub async fn current_branch(git: &dyn GitRunner, cwd: &Path) -> Option<String> {
    let output = git
        .run(cwd, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .ok()?;
    if !output.success() {
        return None;
    }
    let name = output.stdout.trim();
    (!name.is_empty() && name != "HEAD").then(|| name.to_string())
}

/// Files changed in `base..head`, one per line, or `None` when the diff
/// cannot be produced.
pub async fn diff_name_only(
    git: &dyn GitRunner,
    cwd: &Path,
    base: &str,
    head: &str,
) -> Option<Vec<String>> {
    let range = format!("{}..{}", base, head);
    let output = git
        .run(cwd, &["diff", "--name-only", &range])
        .await
        .map_err(|err| debug!("git diff {} failed: {}", range, err))
        .ok()?;
    if !output.success() {
        debug!(
            "git diff {} exited {:?}: {}",
            range,
            output.code,
            output.stderr.trim()
        );
        return None;
    }
    Some(
        output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
