//! XRootD-backed store
//!
//! Drives the `xrdfs` and `xrdcp` command-line tools shipped with the grid
//! client installation on worker nodes.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use crate::command;
use crate::endpoint::Endpoint;
use crate::error::{Result, StorageError};
use crate::RemoteStore;

/// Store talking to XRootD endpoints through the command-line tools
#[derive(Debug, Clone)]
pub struct XrootdStore {
    xrdfs: String,
    xrdcp: String,
    /// Permission string passed to `xrdfs mkdir -m`
    mode: String,
}

impl XrootdStore {
    pub fn new() -> Self {
        Self {
            xrdfs: "xrdfs".to_string(),
            xrdcp: "xrdcp".to_string(),
            mode: "rwxr-xr-x".to_string(),
        }
    }

    /// Overrides the tool binaries (e.g. absolute paths on a worker node)
    pub fn with_programs(xrdfs: impl Into<String>, xrdcp: impl Into<String>) -> Self {
        Self {
            xrdfs: xrdfs.into(),
            xrdcp: xrdcp.into(),
            ..Self::new()
        }
    }

    fn server<'a>(&self, endpoint: &'a Endpoint) -> Result<&'a str> {
        endpoint
            .server()
            .ok_or_else(|| StorageError::InvalidEndpoint(endpoint.to_string()))
    }

    fn abs_path(&self, endpoint: &Endpoint, path: &str) -> Result<String> {
        endpoint
            .abs_path(path)
            .ok_or_else(|| StorageError::InvalidEndpoint(endpoint.to_string()))
    }

    fn url(&self, endpoint: &Endpoint, path: &str) -> Result<String> {
        endpoint
            .url(path)
            .ok_or_else(|| StorageError::InvalidEndpoint(endpoint.to_string()))
    }

    pub(crate) fn mkdir_command(&self, endpoint: &Endpoint, path: &str) -> Result<Command> {
        let mut cmd = Command::new(&self.xrdfs);
        cmd.arg(self.server(endpoint)?)
            .arg("mkdir")
            .arg("-p")
            .arg(format!("-m{}", self.mode))
            .arg(self.abs_path(endpoint, path)?);
        Ok(cmd)
    }

    pub(crate) fn put_command(
        &self,
        endpoint: &Endpoint,
        local: &Path,
        remote_path: &str,
    ) -> Result<Command> {
        let mut cmd = Command::new(&self.xrdcp);
        cmd.arg("-f").arg(local).arg(self.url(endpoint, remote_path)?);
        Ok(cmd)
    }

    pub(crate) fn list_command(&self, endpoint: &Endpoint, path: &str) -> Result<Command> {
        let mut cmd = Command::new(&self.xrdfs);
        cmd.arg(self.server(endpoint)?)
            .arg("ls")
            .arg(self.abs_path(endpoint, path)?);
        Ok(cmd)
    }

    pub(crate) fn read_command(&self, endpoint: &Endpoint, path: &str) -> Result<Command> {
        let mut cmd = Command::new(&self.xrdcp);
        cmd.arg("-f")
            .arg("--silent")
            .arg(self.url(endpoint, path)?)
            .arg("-");
        Ok(cmd)
    }
}

impl Default for XrootdStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for XrootdStore {
    async fn mkdir_all(&self, endpoint: &Endpoint, path: &str) -> Result<()> {
        info!("Creating {} on {}", path, endpoint);
        command::run(&mut self.mkdir_command(endpoint, path)?).await?;
        Ok(())
    }

    async fn put(&self, endpoint: &Endpoint, local: &Path, remote_path: &str) -> Result<()> {
        if !local.is_file() {
            return Err(StorageError::LocalFileMissing(local.to_path_buf()));
        }

        info!("Copying {} to {} on {}", local.display(), remote_path, endpoint);
        command::run(&mut self.put_command(endpoint, local, remote_path)?).await?;
        Ok(())
    }

    async fn list(&self, endpoint: &Endpoint, path: &str) -> Result<Vec<String>> {
        let stdout = command::run(&mut self.list_command(endpoint, path)?).await?;
        let names = parse_listing(&stdout);
        debug!("Listed {} entries under {} on {}", names.len(), path, endpoint);
        Ok(names)
    }

    async fn read_to_string(&self, endpoint: &Endpoint, path: &str) -> Result<String> {
        command::run(&mut self.read_command(endpoint, path)?).await
    }
}

/// `xrdfs ls` prints one absolute path per line; keep the final component
fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.trim_end_matches('/').rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
