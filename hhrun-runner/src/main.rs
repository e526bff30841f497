//! hhrun Runner
//!
//! Executes one batch job on a worker node: provisions the remote output
//! tree, checks out the analysis code, runs the processing script and mirrors
//! its outputs to every configured storage endpoint.
//!
//! Architecture:
//! - Configuration: worker-node settings from the environment
//! - Arguments: the job itself, as flags or as a JSON job file
//! - Services: source control, installation, processing and the workflow
//!   tying them to the remote store
//!
//! The exit code tells the batch system which step failed (see `exit_codes`).

mod args;
mod config;
mod exit_codes;
mod process;
mod service;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hhrun_core::domain::job::JobSpec;
use hhrun_storage::{RemoteStore, RoutingStore, XrootdStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::JobArgs;
use crate::config::Config;
use crate::service::{
    GitSourceControl, Installer, JobRunner, PipInstaller, Processor, PythonProcessor,
    SourceControl,
};

#[derive(Parser)]
#[command(name = "hhrun-runner")]
#[command(about = "Run one HH analysis batch job", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a job described by command-line flags
    Run(JobArgs),

    /// Run a job described by a JSON job file
    RunFile {
        /// Path to the job file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hhrun_runner=info,hhrun_storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            exit_codes::CONFIG_ERROR
        }
    };

    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Runs the requested job and maps the outcome to an exit code
///
/// Errors returned here are setup problems; a failing job is reported
/// through its exit code instead.
async fn run(cli: Cli) -> Result<i32> {
    let spec = match cli.command {
        Command::Run(args) => args.into_spec(),
        Command::RunFile { path } => load_job_file(&path)?,
    };
    spec.validate().context("Invalid job specification")?;

    let config = load_config()?;
    info!(
        "Loaded configuration: workspace={}, git_host={}, strict_uploads={}",
        config.workspace.display(),
        config.git_host,
        config.strict_uploads
    );

    let runner = build_runner(config)?;

    match runner.run(&spec).await {
        Ok(_) => Ok(exit_codes::SUCCESS),
        Err(failure) => Ok(exit_codes::for_step(failure.error.step())),
    }
}

fn load_job_file(path: &Path) -> Result<JobSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse job file {}", path.display()))
}

/// Loads configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Invalid runner configuration")?;
    config.validate()?;
    Ok(config)
}

fn build_runner(config: Config) -> Result<JobRunner> {
    let store: Arc<dyn RemoteStore> = Arc::new(RoutingStore::new(XrootdStore::new()));
    let source: Arc<dyn SourceControl> = Arc::new(GitSourceControl::new(config.git_host.clone()));
    let installer: Arc<dyn Installer> = Arc::new(PipInstaller::new(config.pip.clone()));
    let processor: Arc<dyn Processor> = Arc::new(PythonProcessor::new(config.python.clone()));

    JobRunner::new(config, store, source, installer, processor)
}
