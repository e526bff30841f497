//! Job domain types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default entry point of the analysis code, relative to the checkout
pub const DEFAULT_SCRIPT: &str = "src/run.py";

/// Analysis repository pinned to a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSpec {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl RepoSpec {
    /// Clone URL on the given hosting service (e.g. "https://github.com")
    pub fn clone_url(&self, host: &str) -> String {
        format!("{}/{}/{}", host.trim_end_matches('/'), self.owner, self.name)
    }

    /// Human-readable URL of a commit on the hosting service
    pub fn commit_url(&self, host: &str, hash: &str) -> String {
        format!("{}/commit/{}", self.clone_url(host), hash)
    }
}

/// Parameters forwarded verbatim to the processing script
///
/// None of these are interpreted by the runner; they only shape the
/// command line handed to the external program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingParams {
    #[serde(default = "default_script")]
    pub script: String,
    pub year: String,
    pub starti: u64,
    pub endi: u64,
    pub file_tag: String,
    pub sample: String,
    pub subsample: String,
    pub processor: String,
    #[serde(default)]
    pub maxchunks: u64,
    #[serde(default = "default_chunksize")]
    pub chunksize: u64,
    #[serde(default)]
    pub save_root: bool,
    #[serde(default)]
    pub save_systematics: bool,
    pub nano_version: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_script() -> String {
    DEFAULT_SCRIPT.to_string()
}

fn default_chunksize() -> u64 {
    10_000
}

impl ProcessingParams {
    /// Renders the argument list for the processing script
    ///
    /// The first element is the script itself, followed by the job flags and
    /// finally any extra processor arguments in their original order.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.script.clone(),
            "--year".to_string(),
            self.year.clone(),
            "--starti".to_string(),
            self.starti.to_string(),
            "--endi".to_string(),
            self.endi.to_string(),
            "--samples".to_string(),
            self.sample.clone(),
            "--subsamples".to_string(),
            self.subsample.clone(),
            "--processor".to_string(),
            self.processor.clone(),
            "--maxchunks".to_string(),
            self.maxchunks.to_string(),
            "--chunksize".to_string(),
            self.chunksize.to_string(),
        ];

        args.push(bool_flag("save-root", self.save_root));
        args.push(bool_flag("save-systematics", self.save_systematics));

        args.extend([
            "--nano-version".to_string(),
            self.nano_version.clone(),
            "--file-tag".to_string(),
            self.file_tag.clone(),
        ]);

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

fn bool_flag(name: &str, value: bool) -> String {
    if value {
        format!("--{}", name)
    } else {
        format!("--no-{}", name)
    }
}

/// Everything a single batch job needs to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Storage endpoint prefixes every output is mirrored to
    pub endpoints: Vec<String>,
    /// Output directory under each endpoint
    pub outdir: String,
    pub repo: RepoSpec,
    /// Distinguishes concurrently submitted instances of the same workflow
    pub job_id: u32,
    pub params: ProcessingParams,
}

/// Structural problems with a job specification
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobSpecError {
    #[error("at least one storage endpoint is required")]
    NoEndpoints,

    #[error("storage endpoint at position {0} is empty")]
    EmptyEndpoint(usize),

    #[error("output directory cannot be empty")]
    EmptyOutdir,

    #[error("repository {0} cannot be empty")]
    EmptyRepoField(&'static str),
}

impl JobSpec {
    /// Validates the fields the runner itself relies on
    ///
    /// Processing parameters are deliberately left alone.
    pub fn validate(&self) -> Result<(), JobSpecError> {
        if self.endpoints.is_empty() {
            return Err(JobSpecError::NoEndpoints);
        }

        if let Some(idx) = self.endpoints.iter().position(|e| e.trim().is_empty()) {
            return Err(JobSpecError::EmptyEndpoint(idx));
        }

        if self.outdir.trim().is_empty() {
            return Err(JobSpecError::EmptyOutdir);
        }

        for (field, value) in [
            ("owner", &self.repo.owner),
            ("name", &self.repo.name),
            ("branch", &self.repo.branch),
        ] {
            if value.trim().is_empty() {
                return Err(JobSpecError::EmptyRepoField(field));
            }
        }

        Ok(())
    }
}
