//! Source checkout service
//!
//! Retrieves the pinned analysis repository and resolves the exact commit
//! that was checked out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hhrun_core::domain::job::RepoSpec;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

use crate::process::run_checked;

/// Service trait for retrieving source code
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clones `repo` into `dest`, which must not exist yet
    async fn clone_repo(&self, repo: &RepoSpec, dest: &Path) -> Result<()>;

    /// Commit hash currently checked out in `checkout`
    async fn head_commit(&self, checkout: &Path) -> Result<String>;
}

/// Git-backed implementation of SourceControl
pub struct GitSourceControl {
    program: String,
    host: String,
}

impl GitSourceControl {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            program: "git".to_string(),
            host: host.into(),
        }
    }

    fn clone_command(&self, repo: &RepoSpec, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("clone")
            .arg("--recursive")
            .arg("--single-branch")
            .arg("--depth")
            .arg("1")
            .arg("-b")
            .arg(&repo.branch)
            .arg(repo.clone_url(&self.host))
            .arg(dest);
        cmd
    }
}

#[async_trait]
impl SourceControl for GitSourceControl {
    async fn clone_repo(&self, repo: &RepoSpec, dest: &Path) -> Result<()> {
        info!(
            "Cloning {} (branch {}) into {}",
            repo.clone_url(&self.host),
            repo.branch,
            dest.display()
        );
        run_checked(&mut self.clone_command(repo, dest))
            .await
            .context("git clone failed")?;
        Ok(())
    }

    async fn head_commit(&self, checkout: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("rev-parse").arg("HEAD").current_dir(checkout);

        let output = run_checked(&mut cmd)
            .await
            .context("Failed to resolve checked-out commit")?;
        Ok(output.stdout.trim().to_string())
    }
}

/// Whether `value` looks like a full or abbreviated commit hash
pub fn is_commit_hash(value: &str) -> bool {
    (7..=64).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}
