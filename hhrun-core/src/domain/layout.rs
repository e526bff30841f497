//! Output layout
//!
//! Names of the remote subdirectories each endpoint receives and the local
//! file patterns the processing step leaves behind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local file holding the checked-out commit URL
pub const COMMIT_MARKER_FILE: &str = "commithash.txt";

/// Local directory the processing step writes pickled output into
pub const PICKLE_DIR: &str = "outfiles";

/// Pickled output inside [`PICKLE_DIR`]
pub const PICKLE_PATTERN: &str = "*.pkl";

/// Columnar data files in the working directory
pub const PARQUET_PATTERN: &str = "*.parquet";

/// Histogram / ntuple files in the working directory
pub const ROOT_PATTERN: &str = "*.root";

/// Batch-count markers written by the processing step
pub const BATCH_MARKER_PATTERN: &str = "num_batches*.txt";

/// Files removed from the working directory once outputs are published
pub const CLEANUP_PATTERNS: [&str; 3] = [PARQUET_PATTERN, ROOT_PATTERN, "*.txt"];

/// Kind of artifact, each with its own remote subdirectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Pickle,
    Parquet,
    Root,
    JobCheck,
}

impl ArtifactKind {
    /// All kinds, in provisioning order
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Pickle,
        ArtifactKind::Parquet,
        ArtifactKind::Root,
        ArtifactKind::JobCheck,
    ];

    /// Remote subdirectory name
    pub fn subdir(&self) -> &'static str {
        match self {
            ArtifactKind::Pickle => "pickles",
            ArtifactKind::Parquet => "parquet",
            ArtifactKind::Root => "root",
            ArtifactKind::JobCheck => "jobchecks",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subdir())
    }
}

/// Remote directory tree below a job's output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    outdir: String,
}

impl RemoteLayout {
    pub fn new(outdir: impl Into<String>) -> Self {
        let outdir = outdir.into();
        Self {
            outdir: outdir.trim_end_matches('/').to_string(),
        }
    }

    pub fn outdir(&self) -> &str {
        &self.outdir
    }

    /// Directory for one artifact kind, e.g. `run1/pickles`
    pub fn dir(&self, kind: ArtifactKind) -> String {
        format!("{}/{}", self.outdir, kind.subdir())
    }

    /// Path of a file inside an artifact directory
    pub fn path(&self, kind: ArtifactKind, file_name: &str) -> String {
        format!("{}/{}", self.dir(kind), file_name)
    }

    /// Remote name of the pickled output; re-running a job overwrites it
    pub fn pickle_name(job_id: u32) -> String {
        format!("out_{}.pkl", job_id)
    }

    /// Remote name of the revision marker
    pub fn commit_marker_name(job_id: u32) -> String {
        format!("commithash_{}.txt", job_id)
    }
}
