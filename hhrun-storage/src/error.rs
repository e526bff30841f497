//! Error types for remote storage operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur when talking to a storage endpoint
#[derive(Debug, Error)]
pub enum StorageError {
    /// The transfer tool could not be started
    #[error("Failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The transfer tool ran but reported failure
    #[error("`{command}` exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Endpoint prefix cannot be used with this store
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Mounted endpoint root is absent (storage not mounted)
    #[error("Endpoint root does not exist: {}", .0.display())]
    EndpointMissing(PathBuf),

    /// Local source of an upload does not exist
    #[error("Local file not found: {}", .0.display())]
    LocalFileMissing(PathBuf),

    /// Filesystem error on a mounted endpoint
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Check if this error means the remote path does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Self::CommandFailed { stderr, .. } => {
                let stderr = stderr.to_lowercase();
                stderr.contains("no such file") || stderr.contains("not found")
            }
            Self::LocalFileMissing(_) => true,
            _ => false,
        }
    }
}
