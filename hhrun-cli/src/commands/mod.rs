//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod check;
mod submit;

pub use check::CheckArgs;
pub use submit::SubmitArgs;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Split a fileset into jobs and write (optionally submit) their files
    Submit(SubmitArgs),
    /// Compare remote outputs against the prepared jobs
    Check(CheckArgs),
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit(args) => submit::handle_submit(args, config).await,
        Commands::Check(args) => check::handle_check(args, config).await,
    }
}
