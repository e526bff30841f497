//! Configuration module
//!
//! Settings shared by every command.

use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Grid user owning the output area (`store/user/<user>/...`)
    pub user: String,

    /// Local directory holding the generated job files
    pub condor_dir: PathBuf,
}

impl Config {
    /// Local job directory for a processor and tag, e.g. `condor/skimmer/25Jan_v12`
    pub fn job_dir(&self, processor: &str, tag: &str) -> PathBuf {
        self.condor_dir.join(processor).join(tag)
    }

    /// Remote output area of one processor run, relative to the endpoint
    pub fn output_base(&self, analysis: &str, processor: &str, tag: &str) -> String {
        format!("store/user/{}/{}/{}/{}", self.user, analysis, processor, tag)
    }
}
