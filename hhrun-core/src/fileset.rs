//! Fileset index handling
//!
//! A fileset index maps `sample -> subsample -> [files]`. Jobs never see the
//! file list itself, only the `[starti, endi)` range of their shard, so the
//! submission side only needs file counts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// File lists of every subsample, grouped by sample
pub type SampleFiles = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Number of files per subsample, grouped by sample
pub type FileCounts = BTreeMap<String, BTreeMap<String, usize>>;

#[derive(Debug, Error)]
pub enum FilesetError {
    #[error("failed to parse fileset index: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("year {0} not found in fileset index")]
    YearNotFound(String),

    #[error("sample {0} not found in fileset index")]
    SampleNotFound(String),

    #[error("subsample {subsample} not found for sample {sample}")]
    SubsampleNotFound { sample: String, subsample: String },
}

/// Fileset index for a single year
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesetIndex {
    samples: SampleFiles,
}

impl FilesetIndex {
    /// Parses an index file
    ///
    /// Multi-year files carry an extra top-level `year` key; pass the year to
    /// descend into it, or `None` for a file that already holds one year.
    pub fn from_json(json: &str, year: Option<&str>) -> Result<Self, FilesetError> {
        let samples = match year {
            Some(year) => {
                let mut by_year: BTreeMap<String, SampleFiles> = serde_json::from_str(json)?;
                by_year
                    .remove(year)
                    .ok_or_else(|| FilesetError::YearNotFound(year.to_string()))?
            }
            None => serde_json::from_str(json)?,
        };

        Ok(Self { samples })
    }

    pub fn from_samples(samples: SampleFiles) -> Self {
        Self { samples }
    }

    /// Counts files for the requested samples
    ///
    /// An empty `subsamples` selects every subsample; otherwise each requested
    /// subsample must exist in every requested sample.
    pub fn select(
        &self,
        samples: &[String],
        subsamples: &[String],
    ) -> Result<FileCounts, FilesetError> {
        let mut counts = FileCounts::new();

        for sample in samples {
            let sample_set = self
                .samples
                .get(sample)
                .ok_or_else(|| FilesetError::SampleNotFound(sample.clone()))?;

            let mut selected = BTreeMap::new();
            if subsamples.is_empty() {
                for (subsample, files) in sample_set {
                    selected.insert(subsample.clone(), files.len());
                }
            } else {
                for subsample in subsamples {
                    let files = sample_set.get(subsample).ok_or_else(|| {
                        FilesetError::SubsampleNotFound {
                            sample: sample.clone(),
                            subsample: subsample.clone(),
                        }
                    })?;
                    selected.insert(subsample.clone(), files.len());
                }
            }

            counts.insert(sample.clone(), selected);
        }

        Ok(counts)
    }
}

/// File range handled by one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub job_id: u32,
    pub starti: u64,
    pub endi: u64,
}

/// Splits `total_files` into `ceil(total_files / files_per_job)` shards
///
/// The last shard's `endi` may run past `total_files`; the processing script
/// slices the file list and tolerates that. `limit` caps the number of
/// shards (used for test submissions).
pub fn split_jobs(total_files: usize, files_per_job: usize, limit: Option<usize>) -> Vec<Shard> {
    if files_per_job == 0 {
        return Vec::new();
    }

    let njobs = total_files.div_ceil(files_per_job);
    let njobs = limit.map_or(njobs, |l| njobs.min(l));

    // Job ids are u32; shards past that range are not produced.
    (0..njobs)
        .map_while(|j| {
            Some(Shard {
                job_id: u32::try_from(j).ok()?,
                starti: (j * files_per_job) as u64,
                endi: ((j + 1) * files_per_job) as u64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
        "2022": {
            "HHbbbb": {
                "GluGlutoHHto4B": ["a.root", "b.root", "c.root"],
                "VBFHHto4B": ["d.root"]
            },
            "JetMET": {
                "JetMET_Run2022C": ["e.root", "f.root"]
            }
        }
    }"#;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_all_subsamples() {
        let index = FilesetIndex::from_json(INDEX, Some("2022")).unwrap();
        let counts = index.select(&strings(&["HHbbbb"]), &[]).unwrap();

        assert_eq!(counts["HHbbbb"]["GluGlutoHHto4B"], 3);
        assert_eq!(counts["HHbbbb"]["VBFHHto4B"], 1);
        assert!(!counts.contains_key("JetMET"));
    }

    #[test]
    fn test_select_specific_subsample() {
        let index = FilesetIndex::from_json(INDEX, Some("2022")).unwrap();
        let counts = index
            .select(&strings(&["HHbbbb"]), &strings(&["VBFHHto4B"]))
            .unwrap();

        assert_eq!(counts["HHbbbb"].len(), 1);
        assert_eq!(counts["HHbbbb"]["VBFHHto4B"], 1);
    }

    #[test]
    fn test_select_errors() {
        let index = FilesetIndex::from_json(INDEX, Some("2022")).unwrap();

        assert!(matches!(
            index.select(&strings(&["QCD"]), &[]),
            Err(FilesetError::SampleNotFound(_))
        ));
        assert!(matches!(
            index.select(&strings(&["HHbbbb", "JetMET"]), &strings(&["VBFHHto4B"])),
            Err(FilesetError::SubsampleNotFound { .. })
        ));
        assert!(matches!(
            FilesetIndex::from_json(INDEX, Some("2018")),
            Err(FilesetError::YearNotFound(_))
        ));
    }

    #[test]
    fn test_split_jobs() {
        let shards = split_jobs(45, 20, None);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0], Shard { job_id: 0, starti: 0, endi: 20 });
        assert_eq!(shards[2], Shard { job_id: 2, starti: 40, endi: 60 });

        assert_eq!(split_jobs(40, 20, None).len(), 2);
        assert_eq!(split_jobs(100, 20, Some(2)).len(), 2);
        assert!(split_jobs(0, 20, None).is_empty());
        assert!(split_jobs(10, 0, None).is_empty());
    }
}
