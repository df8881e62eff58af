//! Git collaborator backed by the system `git` binary.

use anyhow::Context;
use async_trait::async_trait;
use covgate_common::{GitOutput, GitRunner};
use std::path::Path;
use tokio::process::Command;

pub struct SystemGit;

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, cwd: &Path, args: &[&str]) -> anyhow::Result<GitOutput> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .context("failed to run git")?;
        Ok(GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        })
    }
}
