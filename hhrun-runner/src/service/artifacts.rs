//! Local artifact discovery and cleanup
//!
//! The processing step leaves its outputs in the working directory. Only
//! files matching the known patterns are ever uploaded or removed; the
//! scan is not recursive and never touches directories.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use hhrun_core::domain::layout::{
    ArtifactKind, BATCH_MARKER_PATTERN, CLEANUP_PATTERNS, PARQUET_PATTERN, PICKLE_DIR,
    PICKLE_PATTERN, ROOT_PATTERN,
};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outputs found after processing, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub pickles: Vec<PathBuf>,
    pub parquet: Vec<PathBuf>,
    pub root: Vec<PathBuf>,
    pub batch_markers: Vec<PathBuf>,
}

impl Artifacts {
    pub fn of_kind(&self, kind: ArtifactKind) -> &[PathBuf] {
        match kind {
            ArtifactKind::Pickle => &self.pickles,
            ArtifactKind::Parquet => &self.parquet,
            ArtifactKind::Root => &self.root,
            ArtifactKind::JobCheck => &self.batch_markers,
        }
    }

    /// Kinds for which nothing was produced
    pub fn missing_kinds(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| self.of_kind(*kind).is_empty())
            .collect()
    }
}

/// Compiled file patterns for the working directory
pub struct ArtifactScanner {
    pickle: GlobSet,
    parquet: GlobSet,
    root: GlobSet,
    batch_markers: GlobSet,
    cleanup: GlobSet,
}

fn compile_globset(globs: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(Glob::new(glob).with_context(|| format!("Invalid glob pattern {}", glob))?);
    }
    Ok(builder.build()?)
}

impl ArtifactScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pickle: compile_globset(&[PICKLE_PATTERN])?,
            parquet: compile_globset(&[PARQUET_PATTERN])?,
            root: compile_globset(&[ROOT_PATTERN])?,
            batch_markers: compile_globset(&[BATCH_MARKER_PATTERN])?,
            cleanup: compile_globset(&CLEANUP_PATTERNS)?,
        })
    }

    /// Finds every output in `workdir`
    pub fn collect(&self, workdir: &Path) -> Result<Artifacts> {
        let pickle_dir = workdir.join(PICKLE_DIR);
        let pickles = if pickle_dir.is_dir() {
            matching_files(&pickle_dir, &self.pickle)?
        } else {
            Vec::new()
        };

        let artifacts = Artifacts {
            pickles,
            parquet: matching_files(workdir, &self.parquet)?,
            root: matching_files(workdir, &self.root)?,
            batch_markers: matching_files(workdir, &self.batch_markers)?,
        };

        debug!(
            "Found {} pickle(s), {} parquet, {} root, {} batch marker(s) in {}",
            artifacts.pickles.len(),
            artifacts.parquet.len(),
            artifacts.root.len(),
            artifacts.batch_markers.len(),
            workdir.display()
        );

        Ok(artifacts)
    }

    /// Removes transient outputs from `workdir`
    ///
    /// Returns the files that were removed. A file that cannot be removed is
    /// logged and skipped.
    pub fn cleanup(&self, workdir: &Path) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();

        for path in matching_files(workdir, &self.cleanup)? {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    removed.push(path);
                }
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }
}

/// Regular files directly inside `dir` whose name matches `set`, sorted
fn matching_files(dir: &Path, set: &GlobSet) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if set.is_match(entry.file_name()) {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}
