//! Running the XRootD command-line tools

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, StorageError};

/// Renders a command for logs and error messages
pub fn describe(command: &Command) -> String {
    let std = command.as_std();
    let mut parts = vec![std.get_program().to_string_lossy().to_string()];
    parts.extend(std.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Runs a command to completion and returns its stdout
///
/// A non-zero exit becomes [`StorageError::CommandFailed`] carrying stderr.
pub(crate) async fn run(command: &mut Command) -> Result<String> {
    let description = describe(command);
    debug!("Running: {}", description);

    let output = command.output().await.map_err(|source| StorageError::Spawn {
        program: command.as_std().get_program().to_string_lossy().to_string(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", description, stderr.trim());
    }

    if !output.status.success() {
        return Err(StorageError::CommandFailed {
            command: description,
            code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(stdout)
}
