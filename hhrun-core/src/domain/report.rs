//! Job report types
//!
//! A report is built up while a job runs and summarises what happened,
//! including every attempted upload.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::layout::ArtifactKind;

/// Steps of a job, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStep {
    Provision,
    Checkout,
    Record,
    Install,
    Process,
    Publish,
    Cleanup,
}

impl JobStep {
    /// One-based position of the step
    pub fn number(&self) -> u8 {
        match self {
            JobStep::Provision => 1,
            JobStep::Checkout => 2,
            JobStep::Record => 3,
            JobStep::Install => 4,
            JobStep::Process => 5,
            JobStep::Publish => 6,
            JobStep::Cleanup => 7,
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStep::Provision => "provision",
            JobStep::Checkout => "checkout",
            JobStep::Record => "record",
            JobStep::Install => "install",
            JobStep::Process => "process",
            JobStep::Publish => "publish",
            JobStep::Cleanup => "cleanup",
        };
        write!(f, "{} (step {})", name, self.number())
    }
}

/// A single attempted copy to a storage endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub endpoint: String,
    pub local: String,
    pub remote: String,
    /// `None` when the copy succeeded
    pub error: Option<String>,
}

impl UploadRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one job execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub run_id: Uuid,
    pub job_id: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_steps: Vec<JobStep>,
    pub checkout_attempts: u32,
    pub commit_url: Option<String>,
    pub processing_exit_code: Option<i32>,
    pub uploads: Vec<UploadRecord>,
    pub missing_outputs: Vec<ArtifactKind>,
    pub cleaned_files: usize,
}

impl JobReport {
    pub fn new(job_id: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job_id,
            started_at: chrono::Utc::now(),
            completed_at: None,
            completed_steps: Vec::new(),
            checkout_attempts: 0,
            commit_url: None,
            processing_exit_code: None,
            uploads: Vec::new(),
            missing_outputs: Vec::new(),
            cleaned_files: 0,
        }
    }

    pub fn complete_step(&mut self, step: JobStep) {
        self.completed_steps.push(step);
    }

    pub fn has_completed(&self, step: JobStep) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(chrono::Utc::now());
    }

    /// Uploads that did not succeed
    pub fn failed_uploads(&self) -> impl Iterator<Item = &UploadRecord> {
        self.uploads.iter().filter(|u| !u.succeeded())
    }
}
