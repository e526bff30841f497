//! Command-line job description

use clap::Args;
use hhrun_core::domain::job::{DEFAULT_SCRIPT, JobSpec, ProcessingParams, RepoSpec};

/// Every job parameter as a flag
#[derive(Debug, Clone, Args)]
pub struct JobArgs {
    /// Storage endpoint prefixes, e.g. root://cmseos.fnal.gov//
    #[arg(long = "t2-prefixes", num_args = 1.., required = true)]
    pub t2_prefixes: Vec<String>,

    /// Output directory below every prefix
    #[arg(long)]
    pub outdir: String,

    #[arg(long, default_value = "LPC-HH")]
    pub git_user: String,

    /// Repository name
    #[arg(long)]
    pub repo: String,

    #[arg(long)]
    pub git_branch: String,

    #[arg(long)]
    pub jobnum: u32,

    /// Processing entry point, relative to the checkout
    #[arg(long, default_value = DEFAULT_SCRIPT)]
    pub script: String,

    #[arg(long)]
    pub year: String,

    #[arg(long)]
    pub starti: u64,

    #[arg(long)]
    pub endi: u64,

    #[arg(long)]
    pub file_tag: String,

    #[arg(long)]
    pub sample: String,

    #[arg(long)]
    pub subsample: String,

    #[arg(long)]
    pub processor: String,

    #[arg(long, default_value_t = 0)]
    pub maxchunks: u64,

    #[arg(long, default_value_t = 10_000)]
    pub chunksize: u64,

    #[arg(long, overrides_with = "no_save_root")]
    pub save_root: bool,

    #[arg(long, overrides_with = "save_root")]
    pub no_save_root: bool,

    #[arg(long, overrides_with = "no_save_systematics")]
    pub save_systematics: bool,

    #[arg(long, overrides_with = "save_systematics")]
    pub no_save_systematics: bool,

    #[arg(long)]
    pub nano_version: String,

    /// Arguments passed through to the processor unchanged
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

impl JobArgs {
    pub fn into_spec(self) -> JobSpec {
        JobSpec {
            endpoints: self.t2_prefixes,
            outdir: self.outdir,
            repo: RepoSpec {
                owner: self.git_user,
                name: self.repo,
                branch: self.git_branch,
            },
            job_id: self.jobnum,
            params: ProcessingParams {
                script: self.script,
                year: self.year,
                starti: self.starti,
                endi: self.endi,
                file_tag: self.file_tag,
                sample: self.sample,
                subsample: self.subsample,
                processor: self.processor,
                maxchunks: self.maxchunks,
                chunksize: self.chunksize,
                save_root: self.save_root && !self.no_save_root,
                save_systematics: self.save_systematics && !self.no_save_systematics,
                nano_version: self.nano_version,
                extra_args: self.extra_args,
            },
        }
    }
}
