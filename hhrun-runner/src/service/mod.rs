//! Service layer
//!
//! Each external concern of a job (version control, package installation,
//! the processing command) sits behind a trait so the workflow can be
//! driven by fakes in tests.

mod artifacts;
mod checkout;
mod install;
mod processing;
mod retry;
mod workflow;

// Re-export traits
pub use checkout::SourceControl;
pub use install::Installer;
pub use processing::Processor;

// Re-export implementations
pub use checkout::GitSourceControl;
pub use install::PipInstaller;
pub use processing::PythonProcessor;

pub use retry::RetryPolicy;
pub use workflow::{JobRunner, RunError, RunFailure};
