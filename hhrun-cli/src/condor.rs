//! HTCondor interaction

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tokio::process::Command;

/// Submits one job description file
pub async fn submit(jdl: &Path) -> Result<()> {
    let output = Command::new("condor_submit")
        .arg(jdl)
        .output()
        .await
        .context("Failed to run condor_submit")?;

    if !output.status.success() {
        anyhow::bail!(
            "condor_submit {} failed: {}",
            jdl.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

/// Names (`<year>_<subsample>_<j>`) of the jobs currently queued or running
pub async fn running_jobs() -> Result<HashSet<String>> {
    let output = Command::new("condor_q")
        .args(["-af", "Args"])
        .output()
        .await
        .context("Failed to run condor_q")?;

    if !output.status.success() {
        anyhow::bail!(
            "condor_q failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(parse_running_jobs(&String::from_utf8_lossy(&output.stdout)))
}

/// Extracts job names from the arguments of queued runner invocations
fn parse_running_jobs(output: &str) -> HashSet<String> {
    output
        .split_whitespace()
        .filter_map(|token| token.strip_suffix(".json"))
        .map(|path| path.rsplit('/').next().unwrap_or(path).to_string())
        .collect()
}
