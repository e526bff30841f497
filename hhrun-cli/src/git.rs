//! Local repository queries
//!
//! Jobs check out the analysis code from the hosting service, so before
//! submitting we make sure that what will run matches the local checkout.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

/// Whether `branch` exists on the remote repository at `url`
pub async fn branch_exists(url: &str, branch: &str) -> Result<bool> {
    let status = Command::new("git")
        .args(["ls-remote", "--exit-code", "--heads", url, branch])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .context("Failed to run git ls-remote")?;

    Ok(status.success())
}

/// Files with uncommitted changes in the current repository
pub async fn uncommitted_changes() -> Result<Vec<String>> {
    let stdout = output(&["status", "--porcelain"]).await?;
    Ok(stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// Commit hash a revision resolves to, e.g. `HEAD` or `origin/main`
pub async fn rev_parse(rev: &str) -> Result<String> {
    Ok(output(&["rev-parse", rev]).await?.trim().to_string())
}

async fn output(args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
