//! Package installation service

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

use crate::process::run_checked;

/// Service trait for installing a checked-out package
#[async_trait]
pub trait Installer: Send + Sync {
    /// Performs an editable install of the package at `path`
    async fn install(&self, path: &Path) -> Result<()>;
}

/// pip-backed implementation of Installer
pub struct PipInstaller {
    program: String,
}

impl PipInstaller {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn install_command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("install").arg("-e").arg(path);
        cmd
    }
}

#[async_trait]
impl Installer for PipInstaller {
    async fn install(&self, path: &Path) -> Result<()> {
        info!("Installing {}", path.display());
        run_checked(&mut self.install_command(path))
            .await
            .with_context(|| format!("Failed to install {}", path.display()))?;
        Ok(())
    }
}
