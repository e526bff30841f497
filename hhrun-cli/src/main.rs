//! hhrun CLI
//!
//! Prepares batch jobs for the runner and checks their outputs on the grid.

mod commands;
mod config;
mod condor;
mod git;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hhrun")]
#[command(about = "HH analysis batch job tooling", long_about = None)]
struct Cli {
    /// Grid user owning the output area
    #[arg(long, env = "USER")]
    user: String,

    /// Local directory for generated job files
    #[arg(long, default_value = "condor")]
    condor_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        user: cli.user,
        condor_dir: cli.condor_dir,
    };

    handle_command(cli.command, &config).await
}
