//! hhrun Storage
//!
//! Client for the remote grid storage that batch jobs mirror their outputs to.
//!
//! Endpoints are addressed by prefix. XRootD prefixes (`root://...`) are
//! handled through the `xrdfs`/`xrdcp` tools, plain paths through the
//! filesystem (for sites mounting their storage locally).
//!
//! # Example
//!
//! ```no_run
//! use hhrun_storage::{Endpoint, RemoteStore, XrootdStore};
//! use std::path::Path;
//!
//! # async fn example() -> hhrun_storage::Result<()> {
//! let store = XrootdStore::new();
//! let endpoint = Endpoint::new("root://cmseos.fnal.gov//");
//!
//! store.mkdir_all(&endpoint, "store/user/me/run1/pickles").await?;
//! store
//!     .put(&endpoint, Path::new("outfiles/0.pkl"), "store/user/me/run1/pickles/out_0.pkl")
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod command;
mod endpoint;
pub mod error;
mod local;
mod routing;
mod xrootd;

pub use command::describe as describe_command;
pub use endpoint::Endpoint;
pub use error::{Result, StorageError};
pub use local::LocalStore;
pub use routing::RoutingStore;
pub use xrootd::XrootdStore;

use async_trait::async_trait;
use std::path::Path;

/// Operations the job tooling needs from a storage endpoint
///
/// Paths are relative to the endpoint prefix.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates a directory and its parents; existing directories are fine
    async fn mkdir_all(&self, endpoint: &Endpoint, path: &str) -> Result<()>;

    /// Copies a local file, overwriting any existing remote file
    async fn put(&self, endpoint: &Endpoint, local: &Path, remote_path: &str) -> Result<()>;

    /// Names of the entries in a remote directory
    async fn list(&self, endpoint: &Endpoint, path: &str) -> Result<Vec<String>>;

    /// Contents of a small remote text file
    async fn read_to_string(&self, endpoint: &Endpoint, path: &str) -> Result<String>;
}
