//! Processing service
//!
//! Invokes the external processing script. The script is a black box: the
//! runner only forwards parameters and looks at the exit code.

use anyhow::Result;
use async_trait::async_trait;
use hhrun_core::domain::job::ProcessingParams;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

use crate::process::run_inherited;

/// Service trait for running the processing step
#[async_trait]
pub trait Processor: Send + Sync {
    /// Runs the processing command in `workdir`
    ///
    /// Returns the exit code, or `None` if the process was killed by a
    /// signal. An `Err` means the command could not be started at all.
    async fn run(&self, params: &ProcessingParams, workdir: &Path) -> Result<Option<i32>>;
}

/// Runs the analysis' Python entry point
pub struct PythonProcessor {
    python: String,
}

impl PythonProcessor {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn command(&self, params: &ProcessingParams, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-u")
            .arg("-W")
            .arg("ignore")
            .args(params.to_args())
            .current_dir(workdir);
        cmd
    }
}

#[async_trait]
impl Processor for PythonProcessor {
    async fn run(&self, params: &ProcessingParams, workdir: &Path) -> Result<Option<i32>> {
        info!(
            "Running {} for {} {} (files {}-{})",
            params.processor, params.year, params.subsample, params.starti, params.endi
        );
        run_inherited(&mut self.command(params, workdir)).await
    }
}
