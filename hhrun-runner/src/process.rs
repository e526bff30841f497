//! External command execution
//!
//! Every step of a job shells out to some tool (git, pip, the processing
//! script). Short tools run with captured output that is logged at debug
//! level; the processing script inherits stdio so its progress shows up in
//! the batch system's job log as it happens.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Output of a captured command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub use hhrun_storage::describe_command as describe;

/// Runs a command with captured output
pub async fn run_captured(command: &mut Command) -> Result<CommandOutput> {
    let description = describe(command);
    debug!("Running: {}", description);

    let output = command
        .output()
        .await
        .with_context(|| format!("Failed to execute `{}`", description))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    if !stdout.trim().is_empty() {
        debug!("{} stdout: {}", description, stdout.trim());
    }
    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", description, stderr.trim());
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code,
    })
}

/// Runs a command with captured output and fails on a non-zero exit
pub async fn run_checked(command: &mut Command) -> Result<CommandOutput> {
    let output = run_captured(command).await?;

    if !output.success() {
        let description = describe(command);
        warn!(
            "Command failed: {} (exit_code={}, stderr='{}')",
            description,
            output.exit_code,
            output.stderr.trim()
        );
        anyhow::bail!(
            "`{}` exited with status {}: {}",
            description,
            output.exit_code,
            output.stderr.trim()
        );
    }

    Ok(output)
}

/// Runs a command with inherited stdio and returns its exit code
///
/// A process killed by a signal reports `None`.
pub async fn run_inherited(command: &mut Command) -> Result<Option<i32>> {
    let description = describe(command);
    debug!("Running: {}", description);

    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to execute `{}`", description))?;

    Ok(status.code())
}
