//! Submit command handler
//!
//! Splits the selected fileset into job shards and writes, per shard, a JSON
//! job file for the runner and an HTCondor description that runs it.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use hhrun_core::domain::job::{DEFAULT_SCRIPT, JobSpec, ProcessingParams, RepoSpec};
use hhrun_core::domain::site::{Analysis, Site};
use hhrun_core::fileset::{FilesetIndex, Shard, split_jobs};
use std::fs;
use std::path::{Path, PathBuf};

use crate::condor;
use crate::config::Config;
use crate::git;

const GIT_HOST: &str = "https://github.com";

/// Jobs per subsample in a test submission
const TEST_JOBS: usize = 2;

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub analysis: Analysis,

    /// Processing entry point, relative to the checkout
    #[arg(long, default_value = DEFAULT_SCRIPT)]
    pub script: String,

    /// Process tag
    #[arg(long, default_value = "Test")]
    pub tag: String,

    /// Fileset index (JSON); a file named `*<year>.json` holds that year
    /// only, any other is keyed by year
    #[arg(long)]
    pub fileset_path: PathBuf,

    #[arg(long)]
    pub year: String,

    #[arg(long, num_args = 1.., required = true)]
    pub samples: Vec<String>,

    /// Subsamples to run; all of each sample when omitted
    #[arg(long, num_args = 1..)]
    pub subsamples: Vec<String>,

    /// Site this submission runs from
    #[arg(long, default_value = "lpc")]
    pub site: Site,

    /// Sites receiving the outputs
    #[arg(long, num_args = 1.., default_values = ["lpc", "ucsd"])]
    pub save_sites: Vec<Site>,

    /// Only create the first two jobs of every subsample
    #[arg(long)]
    pub test: bool,

    #[arg(long, default_value_t = 20)]
    pub files_per_job: usize,

    /// Submit the jobs as well as create them
    #[arg(long)]
    pub submit: bool,

    #[arg(long)]
    pub git_branch: String,

    #[arg(long, default_value = "LPC-HH")]
    pub git_user: String,

    /// Proceed even if the local repository differs from the remote branch
    #[arg(long)]
    pub allow_diff_local_repo: bool,

    /// Grid proxy handed to the jobs
    #[arg(long, env = "X509_USER_PROXY")]
    pub proxy: Option<PathBuf>,

    #[arg(long)]
    pub processor: String,

    #[arg(long, default_value_t = 0)]
    pub maxchunks: u64,

    #[arg(long, default_value_t = 10_000)]
    pub chunksize: u64,

    #[arg(long)]
    pub save_root: bool,

    #[arg(long)]
    pub save_systematics: bool,

    #[arg(long)]
    pub nano_version: String,

    /// Appended to the tag when given
    #[arg(long)]
    pub region: Option<String>,

    /// Runner executable started by each job
    #[arg(long, default_value = "hhrun-runner")]
    pub runner: String,

    /// Arguments passed through to the processor unchanged
    #[arg(last = true)]
    pub processor_args: Vec<String>,
}

/// Handle the submit command
pub async fn handle_submit(args: SubmitArgs, config: &Config) -> Result<()> {
    check_branch(&args).await?;

    let proxy = args
        .proxy
        .clone()
        .context("No grid proxy found. Pass --proxy or set X509_USER_PROXY")?;

    if !args.save_sites.contains(&args.site) {
        println!(
            "{}",
            format!(
                "⚠ Your local site {} is not among the save sites {:?}",
                args.site,
                args.save_sites.iter().map(Site::to_string).collect::<Vec<_>>()
            )
            .yellow()
        );
    }

    let prefixes: Vec<String> = args
        .save_sites
        .iter()
        .map(|site| site.redirector().to_string())
        .collect();

    let tag = job_tag(&args.tag, &args.nano_version, args.region.as_deref());
    let output_base = config.output_base(&args.analysis.to_string(), &args.processor, &tag);
    let local_dir = config.job_dir(&args.processor, &tag);
    fs::create_dir_all(local_dir.join("logs"))
        .with_context(|| format!("Failed to create {}", local_dir.display()))?;
    println!("{} {}", "Condor work dir:".bold(), local_dir.display());

    let index_json = fs::read_to_string(&args.fileset_path)
        .with_context(|| format!("Failed to read {}", args.fileset_path.display()))?;
    let index = FilesetIndex::from_json(&index_json, index_year(&args.fileset_path, &args.year))?;
    let counts = index.select(&args.samples, &args.subsamples)?;

    let limit = args.test.then_some(TEST_JOBS);
    let mut njobs = 0;

    for (sample, subsamples) in &counts {
        for (subsample, total_files) in subsamples {
            if args.submit {
                println!("{} {}", "Submitting".green(), subsample);
            }

            let outdir = format!("{}/{}/{}", output_base, args.year, subsample);
            let name_prefix = job_prefix(&args.year, subsample);

            for shard in split_jobs(*total_files, args.files_per_job, limit) {
                let spec = build_job_spec(&args, &prefixes, &outdir, sample, subsample, shard);
                let name = format!("{}_{}", name_prefix, shard.job_id);
                let jdl = write_job(&local_dir, &name, &spec, &args.runner, &proxy)?;

                if args.submit {
                    condor::submit(&jdl).await?;
                } else {
                    println!("To submit {}", jdl.display());
                }
                njobs += 1;
            }
        }
    }

    println!("{}", format!("Total {} jobs", njobs).bold());
    Ok(())
}

/// Makes sure the jobs will run the code that is checked out locally
async fn check_branch(args: &SubmitArgs) -> Result<()> {
    let repo = RepoSpec {
        owner: args.git_user.clone(),
        name: args.analysis.repo_name().to_string(),
        branch: args.git_branch.clone(),
    };
    let url = repo.clone_url(GIT_HOST);

    if !git::branch_exists(&url, &repo.branch).await? {
        anyhow::bail!("Branch {} does not exist in {}", repo.branch, url);
    }
    println!("Using branch {}", repo.branch.cyan());

    let changes = git::uncommitted_changes().await?;
    if !changes.is_empty() {
        println!("{}", "There are local changes that have not been committed!".red());
        for change in &changes {
            println!("  {}", change);
        }
        proceed_or_bail(args.allow_diff_local_repo)?;
    }

    let local_hash = git::rev_parse("HEAD").await?;
    let remote_hash = git::rev_parse(&format!("origin/{}", repo.branch)).await?;
    if local_hash != remote_hash {
        println!("{}", "Latest local and remote commits do not match!".red());
        println!("Local commit hash: {}", local_hash);
        println!("Remote commit hash: {}", remote_hash);
        proceed_or_bail(args.allow_diff_local_repo)?;
    }

    Ok(())
}

fn proceed_or_bail(allow: bool) -> Result<()> {
    if allow {
        println!("{}", "Proceeding anyway...".red());
        Ok(())
    } else {
        anyhow::bail!("Local repository differs from the remote branch; use --allow-diff-local-repo to override")
    }
}

/// Year level to unwrap from the index, `None` for a per-year file
fn index_year<'a>(path: &Path, year: &'a str) -> Option<&'a str> {
    let per_year = path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(&format!("{}.json", year)));
    (!per_year).then_some(year)
}

fn job_tag(tag: &str, nano_version: &str, region: Option<&str>) -> String {
    match region {
        Some(region) => format!("{}_{}_{}", tag, nano_version, region),
        None => format!("{}_{}", tag, nano_version),
    }
}

fn job_prefix(year: &str, subsample: &str) -> String {
    format!("{}_{}", year, subsample)
}

fn build_job_spec(
    args: &SubmitArgs,
    prefixes: &[String],
    outdir: &str,
    sample: &str,
    subsample: &str,
    shard: Shard,
) -> JobSpec {
    JobSpec {
        endpoints: prefixes.to_vec(),
        outdir: outdir.to_string(),
        repo: RepoSpec {
            owner: args.git_user.clone(),
            name: args.analysis.repo_name().to_string(),
            branch: args.git_branch.clone(),
        },
        job_id: shard.job_id,
        params: ProcessingParams {
            script: args.script.clone(),
            year: args.year.clone(),
            starti: shard.starti,
            endi: shard.endi,
            file_tag: shard.job_id.to_string(),
            sample: sample.to_string(),
            subsample: subsample.to_string(),
            processor: args.processor.clone(),
            maxchunks: args.maxchunks,
            chunksize: args.chunksize,
            save_root: args.save_root,
            save_systematics: args.save_systematics,
            nano_version: args.nano_version.clone(),
            extra_args: args.processor_args.clone(),
        },
    }
}

fn render_jdl(dir: &Path, name: &str, runner: &str, proxy: &Path) -> String {
    let dir = dir.display();
    format!(
        "universe                = vanilla\n\
         executable              = {runner}\n\
         arguments               = run-file {name}.json\n\
         transfer_input_files    = {dir}/{name}.json\n\
         should_transfer_files   = YES\n\
         when_to_transfer_output = ON_EXIT\n\
         output                  = {dir}/logs/{name}.out\n\
         error                   = {dir}/logs/{name}.err\n\
         log                     = {dir}/{name}.jdl.log\n\
         x509userproxy           = {proxy}\n\
         queue 1\n",
        proxy = proxy.display(),
    )
}

/// Writes the job file and its HTCondor description, returning the latter
fn write_job(dir: &Path, name: &str, spec: &JobSpec, runner: &str, proxy: &Path) -> Result<PathBuf> {
    let job_file = dir.join(format!("{}.json", name));
    fs::write(&job_file, serde_json::to_string_pretty(spec)?)
        .with_context(|| format!("Failed to write {}", job_file.display()))?;

    let jdl = dir.join(format!("{}.jdl", name));
    fs::write(&jdl, render_jdl(dir, name, runner, proxy))
        .with_context(|| format!("Failed to write {}", jdl.display()))?;

    // HTCondor appends to an existing user log
    let stale_log = dir.join(format!("{}.jdl.log", name));
    if stale_log.exists() {
        fs::remove_file(&stale_log)
            .with_context(|| format!("Failed to remove {}", stale_log.display()))?;
    }

    Ok(jdl)
}
