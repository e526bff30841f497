//! Job workflow
//!
//! Runs one batch job from start to finish:
//! 1. Provision the remote directory tree on every endpoint
//! 2. Clone the pinned repository, retrying with backoff
//! 3. Record the checked-out revision and upload the marker
//! 4. Install the analysis package and its companion package
//! 5. Run the processing command
//! 6. Publish outputs to every endpoint
//! 7. Remove transient local outputs
//!
//! Each step either completes or fails the whole job; only the checkout is
//! retried.

use hhrun_core::domain::job::{JobSpec, RepoSpec};
use hhrun_core::domain::layout::{ArtifactKind, COMMIT_MARKER_FILE, RemoteLayout};
use hhrun_core::domain::report::{JobReport, JobStep, UploadRecord};
use hhrun_storage::{Endpoint, RemoteStore, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{Config, ProcessingFailurePolicy};
use crate::service::artifacts::{ArtifactScanner, Artifacts};
use crate::service::checkout::{SourceControl, is_commit_hash};
use crate::service::install::Installer;
use crate::service::processing::Processor;

/// Reason a job failed
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to create {path} on {endpoint}: {source}")]
    Provision {
        endpoint: String,
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("Checkout of {repo} failed after {attempts} attempt(s): {message}")]
    Checkout {
        repo: String,
        attempts: u32,
        message: String,
    },

    #[error("Failed to record checked-out revision: {0}")]
    Record(String),

    #[error("Installation failed: {0}")]
    Install(String),

    #[error("Processing command could not be started: {0}")]
    ProcessingLaunch(String),

    #[error("Processing command exited with {}", describe_exit(.exit_code))]
    Processing { exit_code: Option<i32> },

    #[error("Failed to scan local outputs: {0}")]
    Artifacts(String),

    #[error("{failed} upload(s) failed")]
    Publish { failed: usize },

    #[error("Cleanup failed: {0}")]
    Cleanup(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl RunError {
    /// Step the job failed at
    pub fn step(&self) -> JobStep {
        match self {
            RunError::Provision { .. } => JobStep::Provision,
            RunError::Checkout { .. } => JobStep::Checkout,
            RunError::Record(_) => JobStep::Record,
            RunError::Install(_) => JobStep::Install,
            RunError::ProcessingLaunch(_) | RunError::Processing { .. } => JobStep::Process,
            RunError::Artifacts(_) | RunError::Publish { .. } => JobStep::Publish,
            RunError::Cleanup(_) => JobStep::Cleanup,
        }
    }
}

/// A failed job together with what was recorded before the failure
#[derive(Debug, Error)]
#[error("Job failed at {step}: {error}", step = .error.step())]
pub struct RunFailure {
    pub error: RunError,
    pub report: Box<JobReport>,
}

/// Runs batch jobs with injected collaborators
pub struct JobRunner {
    config: Config,
    store: Arc<dyn RemoteStore>,
    source: Arc<dyn SourceControl>,
    installer: Arc<dyn Installer>,
    processor: Arc<dyn Processor>,
    scanner: ArtifactScanner,
}

impl JobRunner {
    pub fn new(
        config: Config,
        store: Arc<dyn RemoteStore>,
        source: Arc<dyn SourceControl>,
        installer: Arc<dyn Installer>,
        processor: Arc<dyn Processor>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            store,
            source,
            installer,
            processor,
            scanner: ArtifactScanner::new()?,
        })
    }

    /// Runs a job and returns its report
    pub async fn run(&self, spec: &JobSpec) -> Result<JobReport, RunFailure> {
        let mut report = JobReport::new(spec.job_id);
        info!(
            "Starting job {} (run {}): {} {} -> {} endpoint(s)",
            spec.job_id,
            report.run_id,
            spec.params.year,
            spec.params.subsample,
            spec.endpoints.len()
        );

        let result = self.execute(spec, &mut report).await;
        report.finish();
        self.write_report(&report).await;

        match result {
            Ok(()) => {
                info!(
                    "Job {} completed: {} upload(s), {} failed, {} file(s) cleaned",
                    spec.job_id,
                    report.uploads.len(),
                    report.failed_uploads().count(),
                    report.cleaned_files
                );
                Ok(report)
            }
            Err(error) => {
                error!("Job {} failed at {}: {}", spec.job_id, error.step(), error);
                Err(RunFailure {
                    error,
                    report: Box::new(report),
                })
            }
        }
    }

    async fn execute(&self, spec: &JobSpec, report: &mut JobReport) -> Result<(), RunError> {
        let endpoints: Vec<Endpoint> = spec
            .endpoints
            .iter()
            .map(|e| Endpoint::new(e.as_str()))
            .collect();
        let layout = RemoteLayout::new(spec.outdir.as_str());

        self.provision(&endpoints, &layout).await?;
        report.complete_step(JobStep::Provision);

        let checkout = self.checkout(&spec.repo, report).await?;
        report.complete_step(JobStep::Checkout);

        self.record_revision(spec, &checkout, &endpoints, &layout, report)
            .await?;
        report.complete_step(JobStep::Record);

        self.install(&checkout).await?;
        report.complete_step(JobStep::Install);

        if let Err(e) = self.process(spec, &checkout, report).await {
            if self.config.on_processing_failure == ProcessingFailurePolicy::PublishPartial {
                warn!("Processing failed, publishing whatever outputs exist");
                self.publish_partial(spec, &checkout, &endpoints, &layout, report)
                    .await;
            }
            return Err(e);
        }
        report.complete_step(JobStep::Process);

        self.publish(spec, &checkout, &endpoints, &layout, report)
            .await?;
        report.complete_step(JobStep::Publish);

        self.cleanup(&checkout, report)?;
        report.complete_step(JobStep::Cleanup);

        Ok(())
    }

    async fn provision(&self, endpoints: &[Endpoint], layout: &RemoteLayout) -> Result<(), RunError> {
        for endpoint in endpoints {
            for kind in ArtifactKind::ALL {
                let path = layout.dir(kind);
                self.store
                    .mkdir_all(endpoint, &path)
                    .await
                    .map_err(|source| RunError::Provision {
                        endpoint: endpoint.to_string(),
                        path: path.clone(),
                        source,
                    })?;
            }
        }

        info!(
            "Provisioned {} on {} endpoint(s)",
            layout.outdir(),
            endpoints.len()
        );
        Ok(())
    }

    async fn checkout(&self, repo: &RepoSpec, report: &mut JobReport) -> Result<PathBuf, RunError> {
        let dest = self.config.workspace.join(&repo.name);

        if dest.exists() {
            warn!("Removing stale checkout at {}", dest.display());
            remove_partial_clone(&dest);
        }

        let policy = self.config.clone_retry();
        let source = &self.source;
        let dest_ref = dest.as_path();

        let result = policy
            .run(
                "git clone",
                move |_| source.clone_repo(repo, dest_ref),
                || remove_partial_clone(dest_ref),
            )
            .await;

        match result {
            Ok(((), attempts)) => {
                report.checkout_attempts = attempts;
                Ok(dest)
            }
            Err(exhausted) => {
                report.checkout_attempts = exhausted.attempts;
                Err(RunError::Checkout {
                    repo: repo.clone_url(&self.config.git_host),
                    attempts: exhausted.attempts,
                    message: format!("{:#}", exhausted.last_error),
                })
            }
        }
    }

    async fn record_revision(
        &self,
        spec: &JobSpec,
        checkout: &Path,
        endpoints: &[Endpoint],
        layout: &RemoteLayout,
        report: &mut JobReport,
    ) -> Result<(), RunError> {
        let hash = self
            .source
            .head_commit(checkout)
            .await
            .map_err(|e| RunError::Record(format!("{:#}", e)))?;

        if !is_commit_hash(&hash) {
            return Err(RunError::Record(format!(
                "'{}' is not a commit hash",
                hash
            )));
        }

        let url = spec.repo.commit_url(&self.config.git_host, &hash);
        info!("Checked out {}", url);

        let marker = checkout.join(COMMIT_MARKER_FILE);
        tokio::fs::write(&marker, format!("{}\n", url))
            .await
            .map_err(|e| RunError::Record(format!("Failed to write {}: {}", marker.display(), e)))?;
        report.commit_url = Some(url);

        let remote = layout.path(
            ArtifactKind::JobCheck,
            &RemoteLayout::commit_marker_name(spec.job_id),
        );
        let before = report.failed_uploads().count();
        for endpoint in endpoints {
            self.upload(endpoint, &marker, remote.clone(), report).await;
        }

        let failed = report.failed_uploads().count() - before;
        if self.config.strict_uploads && failed > 0 {
            return Err(RunError::Record(format!(
                "revision marker upload failed on {} endpoint(s)",
                failed
            )));
        }

        Ok(())
    }

    async fn install(&self, checkout: &Path) -> Result<(), RunError> {
        let companion = checkout.join(&self.config.companion_package);

        for package in [checkout, companion.as_path()] {
            self.installer
                .install(package)
                .await
                .map_err(|e| RunError::Install(format!("{:#}", e)))?;
        }

        Ok(())
    }

    async fn process(
        &self,
        spec: &JobSpec,
        checkout: &Path,
        report: &mut JobReport,
    ) -> Result<(), RunError> {
        let exit_code = self
            .processor
            .run(&spec.params, checkout)
            .await
            .map_err(|e| RunError::ProcessingLaunch(format!("{:#}", e)))?;
        report.processing_exit_code = exit_code;

        match exit_code {
            Some(0) => Ok(()),
            other => Err(RunError::Processing { exit_code: other }),
        }
    }

    async fn publish(
        &self,
        spec: &JobSpec,
        workdir: &Path,
        endpoints: &[Endpoint],
        layout: &RemoteLayout,
        report: &mut JobReport,
    ) -> Result<(), RunError> {
        let artifacts = self
            .scanner
            .collect(workdir)
            .map_err(|e| RunError::Artifacts(format!("{:#}", e)))?;

        report.missing_outputs = artifacts.missing_kinds();
        if !report.missing_outputs.is_empty() {
            let missing: Vec<String> = report
                .missing_outputs
                .iter()
                .map(ToString::to_string)
                .collect();
            warn!("No outputs produced for: {}", missing.join(", "));
        }

        for endpoint in endpoints {
            self.publish_to(spec, endpoint, &artifacts, layout, report)
                .await;
        }

        let failed = report.failed_uploads().count();
        if failed > 0 {
            warn!("{} of {} upload(s) failed", failed, report.uploads.len());
            if self.config.strict_uploads {
                return Err(RunError::Publish { failed });
            }
        }

        Ok(())
    }

    async fn publish_to(
        &self,
        spec: &JobSpec,
        endpoint: &Endpoint,
        artifacts: &Artifacts,
        layout: &RemoteLayout,
        report: &mut JobReport,
    ) {
        for marker in &artifacts.batch_markers {
            let remote = layout.path(ArtifactKind::JobCheck, &file_name(marker));
            self.upload(endpoint, marker, remote, report).await;
        }

        let pickle_remote = layout.path(
            ArtifactKind::Pickle,
            &RemoteLayout::pickle_name(spec.job_id),
        );
        match artifacts.pickles.as_slice() {
            [] => {}
            [pickle] => self.upload(endpoint, pickle, pickle_remote, report).await,
            many => {
                warn!(
                    "{} pickle outputs found, refusing to pick one for {}",
                    many.len(),
                    pickle_remote
                );
                report.uploads.push(UploadRecord {
                    endpoint: endpoint.to_string(),
                    local: many
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                    remote: pickle_remote,
                    error: Some(format!("{} pickle outputs found, expected one", many.len())),
                });
            }
        }

        for (kind, files) in [
            (ArtifactKind::Parquet, &artifacts.parquet),
            (ArtifactKind::Root, &artifacts.root),
        ] {
            for file in files {
                let remote = layout.path(kind, &file_name(file));
                self.upload(endpoint, file, remote, report).await;
            }
        }
    }

    /// Publishes and cleans up after a failed processing step
    ///
    /// Errors here are logged only; the processing failure is what the job
    /// reports.
    async fn publish_partial(
        &self,
        spec: &JobSpec,
        workdir: &Path,
        endpoints: &[Endpoint],
        layout: &RemoteLayout,
        report: &mut JobReport,
    ) {
        if let Err(e) = self.publish(spec, workdir, endpoints, layout, report).await {
            warn!("Publishing partial outputs failed: {}", e);
            return;
        }
        if let Err(e) = self.cleanup(workdir, report) {
            warn!("Cleanup after partial publish failed: {}", e);
        }
    }

    fn cleanup(&self, workdir: &Path, report: &mut JobReport) -> Result<(), RunError> {
        let removed = self
            .scanner
            .cleanup(workdir)
            .map_err(|e| RunError::Cleanup(format!("{:#}", e)))?;

        info!("Removed {} local output file(s)", removed.len());
        report.cleaned_files = removed.len();
        Ok(())
    }

    /// Copies one file, recording the outcome instead of failing
    async fn upload(
        &self,
        endpoint: &Endpoint,
        local: &Path,
        remote: String,
        report: &mut JobReport,
    ) {
        let error = match self.store.put(endpoint, local, &remote).await {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    "Failed to upload {} to {} on {}: {}",
                    local.display(),
                    remote,
                    endpoint,
                    e
                );
                Some(e.to_string())
            }
        };

        report.uploads.push(UploadRecord {
            endpoint: endpoint.to_string(),
            local: local.display().to_string(),
            remote,
            error,
        });
    }

    async fn write_report(&self, report: &JobReport) {
        let Some(path) = &self.config.report_path else {
            return;
        };

        let json = match serde_json::to_string_pretty(report) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize job report: {}", e);
                return;
            }
        };

        if let Err(e) = tokio::fs::write(path, json).await {
            warn!("Failed to write job report to {}: {}", path.display(), e);
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn remove_partial_clone(dest: &Path) {
    if !dest.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(dest) {
        warn!("Failed to remove {}: {}", dest.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use hhrun_core::domain::job::ProcessingParams;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum StoreOp {
        Mkdir { endpoint: String, path: String },
        Put { endpoint: String, remote: String, content: String },
    }

    #[derive(Default)]
    struct FakeStore {
        ops: Mutex<Vec<StoreOp>>,
        failing_mkdir: HashSet<String>,
        failing_put: HashSet<String>,
    }

    impl FakeStore {
        fn ops(&self) -> Vec<StoreOp> {
            self.ops.lock().unwrap().clone()
        }

        fn puts(&self) -> Vec<(String, String)> {
            self.ops()
                .into_iter()
                .filter_map(|op| match op {
                    StoreOp::Put {
                        endpoint, remote, ..
                    } => Some((endpoint, remote)),
                    _ => None,
                })
                .collect()
        }

        fn put_content(&self, remote_path: &str) -> Option<String> {
            self.ops().into_iter().find_map(|op| match op {
                StoreOp::Put { remote, content, .. } if remote == remote_path => Some(content),
                _ => None,
            })
        }
    }

    #[async_trait]
    impl RemoteStore for FakeStore {
        async fn mkdir_all(&self, endpoint: &Endpoint, path: &str) -> hhrun_storage::Result<()> {
            if self.failing_mkdir.contains(endpoint.prefix()) {
                return Err(StorageError::CommandFailed {
                    command: "xrdfs mkdir".to_string(),
                    code: 54,
                    stderr: "Permission denied".to_string(),
                });
            }
            self.ops.lock().unwrap().push(StoreOp::Mkdir {
                endpoint: endpoint.to_string(),
                path: path.to_string(),
            });
            Ok(())
        }

        async fn put(
            &self,
            endpoint: &Endpoint,
            local: &Path,
            remote_path: &str,
        ) -> hhrun_storage::Result<()> {
            if self.failing_put.contains(remote_path) {
                return Err(StorageError::CommandFailed {
                    command: "xrdcp".to_string(),
                    code: 51,
                    stderr: "connection reset".to_string(),
                });
            }
            let content = std::fs::read_to_string(local)?;
            self.ops.lock().unwrap().push(StoreOp::Put {
                endpoint: endpoint.to_string(),
                remote: remote_path.to_string(),
                content,
            });
            Ok(())
        }

        async fn list(&self, _: &Endpoint, _: &str) -> hhrun_storage::Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn read_to_string(&self, _: &Endpoint, _: &str) -> hhrun_storage::Result<String> {
            Ok(String::new())
        }
    }

    /// Fails the first `failures` clones, leaving a partial directory behind
    struct FakeSource {
        failures: u32,
        head: String,
        calls: AtomicU32,
        dest_existed: Mutex<Vec<bool>>,
    }

    impl FakeSource {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                head: HASH.to_string(),
                calls: AtomicU32::new(0),
                dest_existed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SourceControl for FakeSource {
        async fn clone_repo(&self, _repo: &RepoSpec, dest: &Path) -> AnyResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.dest_existed.lock().unwrap().push(dest.exists());

            std::fs::create_dir_all(dest.join(".git"))?;
            if call <= self.failures {
                anyhow::bail!("fatal: unable to access repository (attempt {})", call);
            }
            std::fs::write(dest.join("setup.py"), "")?;
            Ok(())
        }

        async fn head_commit(&self, _checkout: &Path) -> AnyResult<String> {
            Ok(self.head.clone())
        }
    }

    #[derive(Default)]
    struct FakeInstaller {
        installed: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    #[async_trait]
    impl Installer for FakeInstaller {
        async fn install(&self, path: &Path) -> AnyResult<()> {
            if self.fail {
                anyhow::bail!("No matching distribution found");
            }
            self.installed.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    /// Writes a typical set of outputs, then exits with `exit_code`
    struct FakeProcessor {
        exit_code: Option<i32>,
        calls: AtomicU32,
    }

    impl FakeProcessor {
        fn exiting(exit_code: Option<i32>) -> Self {
            Self {
                exit_code,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Processor for FakeProcessor {
        async fn run(&self, params: &ProcessingParams, workdir: &Path) -> AnyResult<Option<i32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let tag = &params.file_tag;

            std::fs::create_dir_all(workdir.join("outfiles"))?;
            std::fs::write(workdir.join(format!("outfiles/{}.pkl", tag)), "pickle")?;
            std::fs::write(workdir.join(format!("out_{}_batch_0.parquet", tag)), "pq")?;
            if self.exit_code == Some(0) {
                std::fs::write(workdir.join(format!("nano_skim_{}_batch_0.root", tag)), "root")?;
                std::fs::write(workdir.join(format!("num_batches_{}.txt", tag)), "1")?;
            }
            Ok(self.exit_code)
        }
    }

    struct Harness {
        workspace: tempfile::TempDir,
        config: Config,
        store: Arc<FakeStore>,
        source: Arc<FakeSource>,
        installer: Arc<FakeInstaller>,
        processor: Arc<FakeProcessor>,
    }

    impl Harness {
        fn new() -> Self {
            let workspace = tempfile::tempdir().unwrap();
            let config = Config {
                workspace: workspace.path().to_path_buf(),
                clone_backoff: Duration::ZERO,
                ..Config::default()
            };
            Self {
                workspace,
                config,
                store: Arc::new(FakeStore::default()),
                source: Arc::new(FakeSource::new(0)),
                installer: Arc::new(FakeInstaller::default()),
                processor: Arc::new(FakeProcessor::exiting(Some(0))),
            }
        }

        fn checkout(&self) -> PathBuf {
            self.workspace.path().join("HH4b")
        }

        async fn run(&self, spec: &JobSpec) -> Result<JobReport, RunFailure> {
            let runner = JobRunner::new(
                self.config.clone(),
                self.store.clone(),
                self.source.clone(),
                self.installer.clone(),
                self.processor.clone(),
            )
            .unwrap();
            runner.run(spec).await
        }
    }

    fn spec(endpoints: &[&str]) -> JobSpec {
        JobSpec {
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            outdir: "run1".to_string(),
            repo: RepoSpec {
                owner: "LPC-HH".to_string(),
                name: "HH4b".to_string(),
                branch: "main".to_string(),
            },
            job_id: 42,
            params: ProcessingParams {
                script: "src/run.py".to_string(),
                year: "2022".to_string(),
                starti: 840,
                endi: 860,
                file_tag: "42".to_string(),
                sample: "HHbbbb".to_string(),
                subsample: "GluGlutoHHto4B".to_string(),
                processor: "skimmer".to_string(),
                maxchunks: 0,
                chunksize: 10_000,
                save_root: true,
                save_systematics: false,
                nano_version: "v12".to_string(),
                extra_args: Vec::new(),
            },
        }
    }

    fn has_matching(dir: &Path, ext: &str) -> bool {
        std::fs::read_dir(dir).unwrap().any(|e| {
            let path = e.unwrap().path();
            path.is_file() && path.extension().is_some_and(|x| x == ext)
        })
    }

    #[tokio::test]
    async fn test_successful_job_publishes_and_cleans_up() {
        let h = Harness::new();
        let report = h.run(&spec(&["root://siteA"])).await.unwrap();

        let puts = h.store.puts();
        let remotes: Vec<&str> = puts.iter().map(|(_, r)| r.as_str()).collect();
        assert!(remotes.contains(&"run1/jobchecks/commithash_42.txt"));
        assert!(remotes.contains(&"run1/pickles/out_42.pkl"));
        assert!(remotes.contains(&"run1/parquet/out_42_batch_0.parquet"));
        assert!(remotes.contains(&"run1/root/nano_skim_42_batch_0.root"));
        assert!(remotes.contains(&"run1/jobchecks/num_batches_42.txt"));

        let checkout = h.checkout();
        assert!(!checkout.join("commithash.txt").exists());
        assert!(!has_matching(&checkout, "parquet"));
        assert!(!has_matching(&checkout, "root"));
        assert!(!has_matching(&checkout, "txt"));
        assert!(checkout.join("outfiles/42.pkl").exists());
        assert!(checkout.join("setup.py").exists());

        assert_eq!(report.completed_steps.len(), 7);
        assert_eq!(report.checkout_attempts, 1);
        assert_eq!(report.cleaned_files, 4);
        assert!(report.missing_outputs.is_empty());
        assert_eq!(report.failed_uploads().count(), 0);
    }

    #[tokio::test]
    async fn test_provisions_four_dirs_before_any_upload() {
        let h = Harness::new();
        h.run(&spec(&["root://siteA"])).await.unwrap();

        let ops = h.store.ops();
        let mkdirs: Vec<&str> = ops
            .iter()
            .take(4)
            .map(|op| match op {
                StoreOp::Mkdir { path, .. } => path.as_str(),
                other => panic!("expected mkdir, got {:?}", other),
            })
            .collect();
        assert_eq!(
            mkdirs,
            vec!["run1/pickles", "run1/parquet", "run1/root", "run1/jobchecks"]
        );
        assert!(
            ops[4..]
                .iter()
                .all(|op| matches!(op, StoreOp::Put { .. }))
        );
    }

    #[tokio::test]
    async fn test_every_artifact_goes_to_every_endpoint() {
        let h = Harness::new();
        let endpoints = ["root://siteA", "root://siteB//store/", "root://siteC"];
        let report = h.run(&spec(&endpoints)).await.unwrap();

        let puts = h.store.puts();
        let per_endpoint = puts.len() / endpoints.len();
        assert_eq!(per_endpoint, 5);

        for endpoint in endpoints {
            let remotes: HashSet<&str> = puts
                .iter()
                .filter(|(e, _)| e == endpoint)
                .map(|(_, r)| r.as_str())
                .collect();
            assert_eq!(remotes.len(), per_endpoint, "endpoint {}", endpoint);
        }
        assert_eq!(report.uploads.len(), puts.len());
    }

    #[tokio::test]
    async fn test_revision_marker_is_commit_url() {
        let h = Harness::new();
        let report = h.run(&spec(&["root://siteA"])).await.unwrap();

        let content = h
            .store
            .put_content("run1/jobchecks/commithash_42.txt")
            .unwrap();
        assert_eq!(
            content,
            format!("https://github.com/LPC-HH/HH4b/commit/{}\n", HASH)
        );
        assert_eq!(content.lines().count(), 1);
        assert_eq!(report.commit_url.as_deref(), Some(content.trim()));
    }

    #[tokio::test]
    async fn test_symbolic_revision_is_rejected() {
        let mut h = Harness::new();
        h.source = Arc::new(FakeSource {
            head: "main".to_string(),
            ..FakeSource::new(0)
        });

        let failure = h.run(&spec(&["root://siteA"])).await.unwrap_err();
        assert_eq!(failure.error.step(), JobStep::Record);
        assert!(h.installer.installed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_installs_checkout_and_companion() {
        let h = Harness::new();
        h.run(&spec(&["root://siteA"])).await.unwrap();

        let installed = h.installer.installed.lock().unwrap().clone();
        assert_eq!(installed, vec![h.checkout(), h.checkout().join("boostedhh")]);
    }

    #[tokio::test]
    async fn test_clone_retries_then_succeeds() {
        let mut h = Harness::new();
        h.source = Arc::new(FakeSource::new(2));

        let report = h.run(&spec(&["root://siteA"])).await.unwrap();

        assert_eq!(report.checkout_attempts, 3);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 3);
        // Every attempt started from a clean slate
        assert_eq!(*h.source.dest_existed.lock().unwrap(), vec![false, false, false]);
        assert_eq!(h.processor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clone_exhaustion_aborts_before_install() {
        let mut h = Harness::new();
        h.source = Arc::new(FakeSource::new(3));

        let failure = h.run(&spec(&["root://siteA"])).await.unwrap_err();

        assert_eq!(failure.error.step(), JobStep::Checkout);
        assert!(matches!(
            failure.error,
            RunError::Checkout { attempts: 3, .. }
        ));
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 3);
        assert!(!h.checkout().exists());
        assert!(h.installer.installed.lock().unwrap().is_empty());
        assert_eq!(h.processor.calls.load(Ordering::SeqCst), 0);
        assert!(h.store.puts().is_empty());
        assert_eq!(h.store.ops().len(), 4);
        assert_eq!(failure.report.completed_steps, vec![JobStep::Provision]);
    }

    #[tokio::test]
    async fn test_provision_failure_is_fatal() {
        let mut h = Harness::new();
        h.store = Arc::new(FakeStore {
            failing_mkdir: HashSet::from(["root://siteB".to_string()]),
            ..FakeStore::default()
        });

        let failure = h
            .run(&spec(&["root://siteA", "root://siteB"]))
            .await
            .unwrap_err();

        assert_eq!(failure.error.step(), JobStep::Provision);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_install_failure_skips_processing() {
        let mut h = Harness::new();
        h.installer = Arc::new(FakeInstaller {
            fail: true,
            ..FakeInstaller::default()
        });

        let failure = h.run(&spec(&["root://siteA"])).await.unwrap_err();
        assert_eq!(failure.error.step(), JobStep::Install);
        assert_eq!(h.processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_processing_failure_aborts_without_publishing() {
        let mut h = Harness::new();
        h.processor = Arc::new(FakeProcessor::exiting(Some(1)));

        let failure = h.run(&spec(&["root://siteA"])).await.unwrap_err();

        assert!(matches!(
            failure.error,
            RunError::Processing { exit_code: Some(1) }
        ));
        let remotes: Vec<String> = h.store.puts().into_iter().map(|(_, r)| r).collect();
        assert_eq!(remotes, vec!["run1/jobchecks/commithash_42.txt"]);
        assert!(h.checkout().join("out_42_batch_0.parquet").exists());
    }

    #[tokio::test]
    async fn test_processing_failure_can_publish_partial_outputs() {
        let mut h = Harness::new();
        h.config.on_processing_failure = ProcessingFailurePolicy::PublishPartial;
        h.processor = Arc::new(FakeProcessor::exiting(None));

        let failure = h.run(&spec(&["root://siteA"])).await.unwrap_err();

        assert_eq!(failure.error.step(), JobStep::Process);
        let remotes: Vec<String> = h.store.puts().into_iter().map(|(_, r)| r).collect();
        assert!(remotes.contains(&"run1/parquet/out_42_batch_0.parquet".to_string()));
        assert!(remotes.contains(&"run1/pickles/out_42.pkl".to_string()));
        assert!(!h.checkout().join("out_42_batch_0.parquet").exists());
        assert_eq!(
            failure.report.missing_outputs,
            vec![ArtifactKind::Root, ArtifactKind::JobCheck]
        );
    }

    #[tokio::test]
    async fn test_failed_upload_is_best_effort_by_default() {
        let mut h = Harness::new();
        h.store = Arc::new(FakeStore {
            failing_put: HashSet::from(["run1/root/nano_skim_42_batch_0.root".to_string()]),
            ..FakeStore::default()
        });

        let report = h.run(&spec(&["root://siteA"])).await.unwrap();

        assert_eq!(report.failed_uploads().count(), 1);
        assert!(!h.checkout().join("nano_skim_42_batch_0.root").exists());
    }

    #[tokio::test]
    async fn test_strict_uploads_keep_local_files() {
        let mut h = Harness::new();
        h.config.strict_uploads = true;
        h.store = Arc::new(FakeStore {
            failing_put: HashSet::from(["run1/root/nano_skim_42_batch_0.root".to_string()]),
            ..FakeStore::default()
        });

        let failure = h.run(&spec(&["root://siteA"])).await.unwrap_err();

        assert!(matches!(failure.error, RunError::Publish { failed: 1 }));
        assert!(h.checkout().join("nano_skim_42_batch_0.root").exists());
    }

    #[tokio::test]
    async fn test_strict_marker_upload_failure_stops_before_install() {
        let mut h = Harness::new();
        h.config.strict_uploads = true;
        h.store = Arc::new(FakeStore {
            failing_put: HashSet::from(["run1/jobchecks/commithash_42.txt".to_string()]),
            ..FakeStore::default()
        });

        let failure = h.run(&spec(&["root://siteA"])).await.unwrap_err();

        assert_eq!(failure.error.step(), JobStep::Record);
        assert!(h.installer.installed.lock().unwrap().is_empty());
        assert_eq!(h.processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unmounted_local_endpoint_fails_provisioning() {
        let h = Harness::new();
        let storage = tempfile::tempdir().unwrap();
        let missing = storage.path().join("eos");
        let endpoint = format!("file://{}", missing.display());

        let runner = JobRunner::new(
            h.config.clone(),
            Arc::new(hhrun_storage::LocalStore::new()),
            h.source.clone(),
            h.installer.clone(),
            h.processor.clone(),
        )
        .unwrap();

        let failure = runner.run(&spec(&[endpoint.as_str()])).await.unwrap_err();

        assert_eq!(failure.error.step(), JobStep::Provision);
        assert!(matches!(
            failure.error,
            RunError::Provision {
                source: StorageError::EndpointMissing(_),
                ..
            }
        ));
        assert!(!missing.exists());
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_pickles_are_not_uploaded() {
        let h = Harness::new();
        let processor = Arc::new(FakeProcessor::exiting(Some(0)));
        let runner = JobRunner::new(
            h.config.clone(),
            h.store.clone(),
            Arc::new(ExtraPickleSource(FakeSource::new(0))),
            h.installer.clone(),
            processor,
        )
        .unwrap();

        let report = runner.run(&spec(&["root://siteA"])).await.unwrap();

        assert!(
            !h.store
                .puts()
                .iter()
                .any(|(_, r)| r == "run1/pickles/out_42.pkl")
        );
        assert_eq!(report.failed_uploads().count(), 1);
    }

    /// Clones normally but leaves a stray pickle in `outfiles/`
    struct ExtraPickleSource(FakeSource);

    #[async_trait]
    impl SourceControl for ExtraPickleSource {
        async fn clone_repo(&self, repo: &RepoSpec, dest: &Path) -> AnyResult<()> {
            self.0.clone_repo(repo, dest).await?;
            std::fs::create_dir_all(dest.join("outfiles"))?;
            std::fs::write(dest.join("outfiles/stale.pkl"), "old")?;
            Ok(())
        }

        async fn head_commit(&self, checkout: &Path) -> AnyResult<String> {
            self.0.head_commit(checkout).await
        }
    }

    #[tokio::test]
    async fn test_report_written_to_configured_path() {
        let mut h = Harness::new();
        let report_path = h.workspace.path().join("report.json");
        h.config.report_path = Some(report_path.clone());

        let report = h.run(&spec(&["root://siteA"])).await.unwrap();

        let written: JobReport =
            serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
        assert_eq!(written.run_id, report.run_id);
        assert_eq!(written.job_id, 42);
        assert!(written.completed_at.is_some());
    }
}
