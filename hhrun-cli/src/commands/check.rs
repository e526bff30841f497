//! Check command handler
//!
//! Compares the outputs that finished jobs left on a storage endpoint with
//! the jobs prepared locally, and lists (optionally resubmits) the jobs whose
//! outputs are missing or incomplete.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use hhrun_core::domain::job::JobSpec;
use hhrun_core::domain::layout::ArtifactKind;
use hhrun_core::domain::site::{Analysis, Site};
use hhrun_storage::{Endpoint, RemoteStore, RoutingStore};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use crate::condor;
use crate::config::Config;

/// Processor whose jobs only write pickles
const PICKLE_ONLY_PROCESSOR: &str = "trigger";

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[arg(long)]
    pub processor: String,

    #[arg(long)]
    pub analysis: Analysis,

    /// Site whose storage is checked
    #[arg(long, default_value = "lpc")]
    pub site: Site,

    /// Storage prefix to read from instead of the site redirector
    /// (e.g. a local mount such as /eos/uscms/)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Job tag, including the nano version (and region)
    #[arg(long, default_value = "")]
    pub tag: String,

    #[arg(long)]
    pub year: String,

    /// Rewrite `--batch-size` for the missing jobs
    #[arg(long)]
    pub change_batch_size: Option<u32>,

    /// Resubmit the missing jobs
    #[arg(long)]
    pub submit_missing: bool,

    /// Skip jobs that are still queued or running
    #[arg(long)]
    pub check_running: bool,
}

/// What is wrong with one job's outputs
#[derive(Debug, Clone, PartialEq, Eq)]
enum Problem {
    MissingPickle,
    MissingAllParquet,
    MissingBatchCount,
    MissingBatches(Vec<u32>),
}

/// Outputs of one sample found on the endpoint
#[derive(Debug, Default)]
struct SampleOutputs {
    pickles: BTreeSet<u32>,
    /// `None` when the sample has no parquet directory at all
    parquet: Option<BTreeMap<u32, BTreeSet<u32>>>,
    batch_counts: BTreeMap<u32, u32>,
}

/// Handle the check command
pub async fn handle_check(args: CheckArgs, config: &Config) -> Result<()> {
    let store = RoutingStore::default();
    let endpoint = Endpoint::new(
        args.endpoint
            .clone()
            .unwrap_or_else(|| args.site.redirector().to_string()),
    );

    let base = format!(
        "{}/{}",
        config.output_base(&args.analysis.to_string(), &args.processor, &args.tag),
        args.year
    );
    let local_dir = config.job_dir(&args.processor, &args.tag);

    let samples = store
        .list(&endpoint, &base)
        .await
        .with_context(|| format!("Failed to list {} on {}", base, endpoint))?;
    let expected = expected_jobs(&local_jdls(&local_dir)?, &args.year);

    let running = if args.check_running {
        condor::running_jobs().await?
    } else {
        HashSet::new()
    };

    let check_parquet = args.processor != PICKLE_ONLY_PROCESSOR;
    let mut missing = Vec::new();

    for sample in &samples {
        println!("{} {}", "Checking".bold(), sample);

        let Some(&njobs) = expected.get(sample) else {
            println!("{}", format!("No local jobs for {}", sample).yellow());
            continue;
        };

        let sample_dir = format!("{}/{}", base, sample);
        let outputs = scan_sample(&store, &endpoint, &sample_dir, check_parquet).await?;

        if check_parquet && outputs.parquet.is_none() {
            println!("{}", format!("No parquet directory for {}!", sample).red());
        }

        for (job, problems) in find_problems(njobs, &outputs, check_parquet) {
            let name = format!("{}_{}_{}", args.year, sample, job);
            if running.contains(&name) {
                println!("Job #{} for sample {} is running.", job, sample);
                continue;
            }

            for problem in &problems {
                println!("{}", describe(problem, job, sample).red());
            }
            missing.push(name);
        }
    }

    println!();
    println!("{}", format!("{} job(s) to re-run:", missing.len()).bold());
    for name in &missing {
        println!("{}", local_dir.join(format!("{}.jdl", name)).display());
    }

    if let Some(batch_size) = args.change_batch_size {
        println!();
        println!("Changing the batch size to {} in:", batch_size);
        for name in &missing {
            let job_file = local_dir.join(format!("{}.json", name));
            println!("{}", job_file.display());
            rewrite_batch_size(&job_file, batch_size)?;
        }
    }

    if args.submit_missing {
        for name in &missing {
            condor::submit(&local_dir.join(format!("{}.jdl", name))).await?;
        }
        println!("{}", format!("✓ Resubmitted {} job(s)", missing.len()).green());
    }

    println!();
    println!("{}", "Error files:".bold());
    for name in &missing {
        println!("{}", local_dir.join("logs").join(format!("{}.err", name)).display());
    }

    Ok(())
}

/// Names of the job description files in the local job directory
fn local_jdls(dir: &Path) -> Result<Vec<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().to_string();
        if name.ends_with(".jdl") {
            names.push(name);
        }
    }
    Ok(names)
}

/// Expected number of jobs per subsample: highest job index + 1
///
/// Job files are named `<year>_<subsample>_<j>.jdl`; subsample names may
/// contain underscores themselves.
fn expected_jobs(jdls: &[String], year: &str) -> BTreeMap<String, u32> {
    let mut expected = BTreeMap::new();

    for jdl in jdls {
        let Some(stem) = jdl.strip_suffix(".jdl") else {
            continue;
        };
        let Some((rest, index)) = stem.rsplit_once('_') else {
            continue;
        };
        let Some((jdl_year, sample)) = rest.split_once('_') else {
            continue;
        };
        let Ok(index) = index.parse::<u32>() else {
            continue;
        };
        if jdl_year != year || sample.is_empty() {
            continue;
        }

        let count = expected.entry(sample.to_string()).or_insert(0);
        *count = (*count).max(index.saturating_add(1));
    }

    expected
}

/// Lists a directory, treating a missing one as `None`
async fn list_optional(
    store: &dyn RemoteStore,
    endpoint: &Endpoint,
    path: &str,
) -> Result<Option<Vec<String>>> {
    match store.list(endpoint, path).await {
        Ok(names) => Ok(Some(names)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to list {} on {}", path, endpoint)),
    }
}

async fn scan_sample(
    store: &dyn RemoteStore,
    endpoint: &Endpoint,
    sample_dir: &str,
    check_parquet: bool,
) -> Result<SampleOutputs> {
    let dir = |kind: ArtifactKind| format!("{}/{}", sample_dir, kind.subdir());
    let mut outputs = SampleOutputs::default();

    if let Some(names) = list_optional(store, endpoint, &dir(ArtifactKind::Pickle)).await? {
        outputs.pickles = names.iter().filter_map(|n| parse_pickle_name(n)).collect();
    }

    if !check_parquet {
        return Ok(outputs);
    }

    if let Some(names) = list_optional(store, endpoint, &dir(ArtifactKind::Parquet)).await? {
        let mut parquet: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
        for (job, batch) in names.iter().filter_map(|n| parse_parquet_name(n)) {
            parquet.entry(job).or_default().insert(batch);
        }
        outputs.parquet = Some(parquet);
    }

    let jobchecks = dir(ArtifactKind::JobCheck);
    for name in list_optional(store, endpoint, &jobchecks).await?.unwrap_or_default() {
        let Some(job) = parse_batch_marker_name(&name) else {
            continue;
        };
        let content = store
            .read_to_string(endpoint, &format!("{}/{}", jobchecks, name))
            .await
            .with_context(|| format!("Failed to read {}", name))?;
        match content.lines().next().map(str::trim).map(str::parse::<u32>) {
            Some(Ok(count)) => {
                outputs.batch_counts.insert(job, count);
            }
            _ => println!("{}", format!("Unreadable batch count in {}", name).yellow()),
        }
    }

    Ok(outputs)
}

/// Jobs in `0..njobs` with incomplete outputs
fn find_problems(
    njobs: u32,
    outputs: &SampleOutputs,
    check_parquet: bool,
) -> Vec<(u32, Vec<Problem>)> {
    let mut result = Vec::new();

    for job in 0..njobs {
        let mut problems = Vec::new();

        if check_parquet {
            match outputs.parquet.as_ref().and_then(|p| p.get(&job)) {
                None => problems.push(Problem::MissingAllParquet),
                Some(batches) => match outputs.batch_counts.get(&job) {
                    None => problems.push(Problem::MissingBatchCount),
                    Some(&count) => {
                        let missing: Vec<u32> =
                            (0..count).filter(|b| !batches.contains(b)).collect();
                        if !missing.is_empty() {
                            problems.push(Problem::MissingBatches(missing));
                        }
                    }
                },
            }
        }

        if !outputs.pickles.contains(&job) {
            problems.push(Problem::MissingPickle);
        }

        if !problems.is_empty() {
            result.push((job, problems));
        }
    }

    result
}

fn describe(problem: &Problem, job: u32, sample: &str) -> String {
    match problem {
        Problem::MissingPickle => format!("Missing output pickle #{} for sample {}", job, sample),
        Problem::MissingAllParquet => {
            format!("Missing all output parquets for job #{} for sample {}", job, sample)
        }
        Problem::MissingBatchCount => {
            format!("Missing batch count for job #{} for sample {}", job, sample)
        }
        Problem::MissingBatches(batches) => format!(
            "Missing batches {:?} for job #{} for sample {}",
            batches, job, sample
        ),
    }
}

/// `out_<j>.pkl` -> j
fn parse_pickle_name(name: &str) -> Option<u32> {
    name.strip_prefix("out_")?.strip_suffix(".pkl")?.parse().ok()
}

/// `out_<j>_batch_<b>.parquet` -> (j, b)
fn parse_parquet_name(name: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix("out_")?.strip_suffix(".parquet")?;
    let (job, batch) = rest.split_once("_batch_")?;
    Some((job.parse().ok()?, batch.parse().ok()?))
}

/// `num_batches_<j>.txt` -> j
fn parse_batch_marker_name(name: &str) -> Option<u32> {
    name.strip_prefix("num_batches_")?
        .strip_suffix(".txt")?
        .parse()
        .ok()
}

/// Sets `--batch-size <n>` in the processor arguments, replacing any value
fn set_batch_size(args: &mut Vec<String>, batch_size: u32) {
    let value = batch_size.to_string();

    match args.iter().position(|a| a == "--batch-size") {
        Some(i) if i + 1 < args.len() => args[i + 1] = value,
        Some(_) => args.push(value),
        None => args.extend(["--batch-size".to_string(), value]),
    }
}

fn rewrite_batch_size(job_file: &Path, batch_size: u32) -> Result<()> {
    let content = fs::read_to_string(job_file)
        .with_context(|| format!("Failed to read {}", job_file.display()))?;
    let mut spec: JobSpec = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", job_file.display()))?;

    set_batch_size(&mut spec.params.extra_args, batch_size);

    fs::write(job_file, serde_json::to_string_pretty(&spec)?)
        .with_context(|| format!("Failed to write {}", job_file.display()))?;
    Ok(())
}
