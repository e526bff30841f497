//! Mounted-filesystem store
//!
//! Sites expose their storage through a POSIX mount as well (e.g.
//! `/eos/uscms`). This store performs the same operations with plain
//! filesystem calls.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::endpoint::Endpoint;
use crate::error::{Result, StorageError};
use crate::RemoteStore;

#[derive(Debug, Clone, Default)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }

    fn root(&self, endpoint: &Endpoint) -> Result<PathBuf> {
        endpoint
            .local_root()
            .ok_or_else(|| StorageError::InvalidEndpoint(endpoint.to_string()))
    }

    fn resolve(&self, endpoint: &Endpoint, path: &str) -> Result<PathBuf> {
        Ok(self.root(endpoint)?.join(path.trim_start_matches('/')))
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn mkdir_all(&self, endpoint: &Endpoint, path: &str) -> Result<()> {
        // The root itself is never created: a missing mount must not turn
        // into an empty local directory.
        let root = self.root(endpoint)?;
        if !tokio::fs::metadata(&root).await.is_ok_and(|m| m.is_dir()) {
            return Err(StorageError::EndpointMissing(root));
        }

        let dir = self.resolve(endpoint, path)?;
        info!("Creating {}", dir.display());

        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder.create(&dir).await?;
        Ok(())
    }

    async fn put(&self, endpoint: &Endpoint, local: &Path, remote_path: &str) -> Result<()> {
        if !local.is_file() {
            return Err(StorageError::LocalFileMissing(local.to_path_buf()));
        }

        let dest = self.resolve(endpoint, remote_path)?;
        info!("Copying {} to {}", local.display(), dest.display());
        tokio::fs::copy(local, &dest).await?;
        Ok(())
    }

    async fn list(&self, endpoint: &Endpoint, path: &str) -> Result<Vec<String>> {
        let dir = self.resolve(endpoint, path)?;
        let mut entries = tokio::fs::read_dir(&dir).await?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    async fn read_to_string(&self, endpoint: &Endpoint, path: &str) -> Result<String> {
        let file = self.resolve(endpoint, path)?;
        Ok(tokio::fs::read_to_string(file).await?)
    }
}
