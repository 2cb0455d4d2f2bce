use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use dupe_analyser_core::{
    discover_all, Analyser, DiscoverOptions, EngineConfig, FsObjectStore, GcsObjectStore,
    KeyFormat, ObjectStore, Report, SourceHandle, DEFAULT_WORKERS, GCS_SCHEME,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_check_key")]
    pub check_key: bool,
    #[serde(default)]
    pub check_row: bool,
    #[serde(default)]
    pub validate_only: bool,
    #[serde(default)]
    pub key_format: KeyFormat,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub object_store_dir: Option<PathBuf>,
}

fn default_key() -> String {
    "id".to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_check_key() -> bool {
    true
}

impl Default for JobRequest {
    fn default() -> Self {
        Self {
            job_id: None,
            paths: Vec::new(),
            key: default_key(),
            workers: default_workers(),
            check_key: default_check_key(),
            check_row: false,
            validate_only: false,
            key_format: KeyFormat::default(),
            excludes: Vec::new(),
            object_store_dir: None,
        }
    }
}

impl JobRequest {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            key: self.key.clone(),
            workers: self.workers,
            check_key: self.check_key,
            check_row: self.check_row,
            validate_only: self.validate_only,
            key_format: self.key_format,
        }
    }

    /// A configured directory serves `gs://` roots offline; otherwise they
    /// go to Cloud Storage, and local-only jobs get no store at all.
    fn discover_options(&self) -> Result<DiscoverOptions> {
        let object_store: Option<Arc<dyn ObjectStore>> = match &self.object_store_dir {
            Some(dir) => Some(Arc::new(FsObjectStore::new(dir))),
            None if self.paths.iter().any(|path| path.trim().starts_with(GCS_SCHEME)) => {
                let store = GcsObjectStore::from_env()
                    .context("failed to set up the Cloud Storage client")?;
                Some(Arc::new(store))
            }
            None => None,
        };
        Ok(DiscoverOptions {
            excludes: self.excludes.clone(),
            object_store,
            cancel_flag: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub files_processed: u64,
    pub total_files: u64,
    pub rows_processed: u64,
    pub current_folder: Option<String>,
    pub elapsed_ms: u64,
    pub cancel_requested: bool,
    pub runs: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueJobResponse {
    pub job_id: String,
    pub remaining: usize,
    pub status: JobStatus,
}

/// One job: the engine persists across continue runs and is replaced on
/// restart. `sources` is always the full discovered list.
struct Job {
    status: JobStatus,
    analyser: Arc<Analyser>,
    sources: Arc<Vec<SourceHandle>>,
    cancel_flag: Arc<AtomicBool>,
    report: Option<Report>,
    error: Option<String>,
    elapsed: Duration,
    run_started: Option<Instant>,
    runs: u32,
}

static JOBS: Lazy<Mutex<HashMap<String, Job>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Discovers sources and starts the first run in the background. Discovery
/// failures are returned directly and no job is registered.
pub fn start_job(request: JobRequest) -> Result<String> {
    let config = request.engine_config();
    config.validate()?;

    let job_id = request
        .job_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Some(existing) = lock_jobs()?.get(&job_id) {
        if existing.status == JobStatus::Running {
            return Err(anyhow!("job {job_id} is already running"));
        }
    }

    let sources = discover_all(&request.paths, &request.discover_options()?)
        .with_context(|| format!("source discovery failed for job {job_id}"))?;
    info!(
        "job {} discovered {} source(s) under {}",
        job_id,
        sources.len(),
        request.paths.join(", ")
    );

    let job = Job {
        status: JobStatus::Running,
        analyser: Arc::new(Analyser::new(config)),
        sources: Arc::new(sources),
        cancel_flag: Arc::new(AtomicBool::new(false)),
        report: None,
        error: None,
        elapsed: Duration::ZERO,
        run_started: None,
        runs: 0,
    };
    let mut jobs = lock_jobs()?;
    jobs.insert(job_id.clone(), job);
    if let Some(job) = jobs.get_mut(&job_id) {
        let sources = Arc::clone(&job.sources);
        launch(&job_id, job, sources);
    }
    Ok(job_id)
}

/// Requests cancellation. The job stays `Running` until its workers exit.
pub fn cancel_job(job_id: &str) -> Result<CancelJobResponse> {
    let jobs = lock_jobs()?;
    let job = find(&jobs, job_id)?;
    job.cancel_flag.store(true, Ordering::Relaxed);
    info!("job {job_id}: cancellation requested");

    Ok(CancelJobResponse {
        job_id: job_id.to_string(),
        status: job.status.clone(),
    })
}

/// Resumes a cancelled job over its unprocessed sources with the same engine,
/// so the next report merges both phases.
pub fn continue_job(job_id: &str) -> Result<ContinueJobResponse> {
    let mut jobs = lock_jobs()?;
    let job = find_mut(&mut jobs, job_id)?;
    if job.status != JobStatus::Cancelled {
        return Err(anyhow!(
            "job {job_id} cannot continue from status {:?}",
            job.status
        ));
    }

    let remaining = job.analyser.unprocessed_sources(&job.sources);
    job.cancel_flag = Arc::new(AtomicBool::new(false));
    if remaining.is_empty() {
        job.report = Some(job.analyser.build_report(false));
        job.status = JobStatus::Completed;
        info!("job {job_id}: nothing left to continue");
    } else {
        info!("job {job_id}: continuing with {} source(s)", remaining.len());
        launch(job_id, job, Arc::new(remaining.clone()));
    }

    Ok(ContinueJobResponse {
        job_id: job_id.to_string(),
        remaining: remaining.len(),
        status: job.status.clone(),
    })
}

/// Discards the job's engine and reruns the full source list from scratch.
pub fn restart_job(job_id: &str) -> Result<()> {
    let mut jobs = lock_jobs()?;
    let job = find_mut(&mut jobs, job_id)?;
    if job.status == JobStatus::Running {
        return Err(anyhow!("job {job_id} is still running"));
    }

    job.analyser = Arc::new(Analyser::new(job.analyser.config().clone()));
    job.cancel_flag = Arc::new(AtomicBool::new(false));
    job.report = None;
    job.error = None;
    job.elapsed = Duration::ZERO;
    job.runs = 0;
    info!("job {job_id}: restarting over {} source(s)", job.sources.len());
    let sources = Arc::clone(&job.sources);
    launch(job_id, job, sources);
    Ok(())
}

pub fn get_job(job_id: &str) -> Result<JobSnapshot> {
    let jobs = lock_jobs()?;
    let job = find(&jobs, job_id)?;
    let progress = job.analyser.progress();
    let elapsed = job.elapsed + job.run_started.map(|t| t.elapsed()).unwrap_or_default();

    Ok(JobSnapshot {
        job_id: job_id.to_string(),
        status: job.status.clone(),
        files_processed: progress.files_processed,
        total_files: job.sources.len() as u64,
        rows_processed: progress.rows_processed,
        current_folder: progress.current_folder,
        elapsed_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
        cancel_requested: job.cancel_flag.load(Ordering::Relaxed),
        runs: job.runs,
        error: job.error.clone(),
    })
}

pub fn job_report(job_id: &str) -> Result<Option<Report>> {
    let jobs = lock_jobs()?;
    Ok(find(&jobs, job_id)?.report.clone())
}

/// Polls until the job leaves `Running` or `timeout` passes.
pub fn wait_for_job(job_id: &str, timeout: Duration) -> Result<JobSnapshot> {
    let started = Instant::now();
    loop {
        let snapshot = get_job(job_id)?;
        if snapshot.status != JobStatus::Running {
            return Ok(snapshot);
        }
        if started.elapsed() >= timeout {
            return Err(anyhow!("timed out waiting for job {job_id}"));
        }
        thread::sleep(Duration::from_millis(25));
    }
}

pub fn remove_job(job_id: &str) -> Result<()> {
    let mut jobs = lock_jobs()?;
    if find(&jobs, job_id)?.status == JobStatus::Running {
        return Err(anyhow!("job {job_id} is still running"));
    }
    jobs.remove(job_id);
    Ok(())
}

fn launch(job_id: &str, job: &mut Job, sources: Arc<Vec<SourceHandle>>) {
    job.status = JobStatus::Running;
    job.run_started = Some(Instant::now());
    job.runs += 1;

    let thread_job_id = job_id.to_string();
    let analyser = Arc::clone(&job.analyser);
    let cancel_flag = Arc::clone(&job.cancel_flag);
    thread::spawn(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            analyser.run(&cancel_flag, &sources)
        }));

        let Ok(mut jobs) = lock_jobs() else {
            error!("job {thread_job_id}: registry lock poisoned, result dropped");
            return;
        };
        let Some(job) = jobs.get_mut(&thread_job_id) else {
            return;
        };
        if let Some(started) = job.run_started.take() {
            job.elapsed += started.elapsed();
        }
        match outcome {
            Ok(report) => {
                job.status = if cancel_flag.load(Ordering::Relaxed) {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Completed
                };
                job.report = Some(report);
                job.error = None;
            }
            Err(_) => {
                error!("job {thread_job_id}: analysis thread panicked");
                job.status = JobStatus::Failed;
                job.error = Some("analysis thread panicked".to_string());
            }
        }
        info!("job {thread_job_id} finished as {:?}", job.status);
    });
}

fn find<'a>(jobs: &'a HashMap<String, Job>, job_id: &str) -> Result<&'a Job> {
    jobs.get(job_id)
        .ok_or_else(|| anyhow!("job not found: {job_id}"))
}

fn find_mut<'a>(jobs: &'a mut HashMap<String, Job>, job_id: &str) -> Result<&'a mut Job> {
    jobs.get_mut(job_id)
        .ok_or_else(|| anyhow!("job not found: {job_id}"))
}

fn lock_jobs() -> Result<std::sync::MutexGuard<'static, HashMap<String, Job>>> {
    JOBS.lock()
        .map_err(|_| anyhow!("job registry lock poisoned"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::{
        cancel_job, continue_job, get_job, job_report, remove_job, restart_job, start_job,
        wait_for_job, JobRequest, JobStatus,
    };

    const WAIT: Duration = Duration::from_secs(30);

    fn fixture(root: &Path, files: usize) {
        for index in 0..files {
            let dir = root.join(format!("batch-{}", index % 3));
            fs::create_dir_all(&dir).expect("mkdir");
            fs::write(
                dir.join(format!("{index}.json")),
                format!("{{\"id\":\"same\"}}\n{{\"id\":{index}}}\n"),
            )
            .expect("write");
        }
    }

    fn request(root: &Path) -> JobRequest {
        JobRequest {
            paths: vec![root.to_string_lossy().to_string()],
            workers: 2,
            ..JobRequest::default()
        }
    }

    #[test]
    fn job_runs_to_completion() {
        let temp = TempDir::new().expect("tempdir");
        fixture(temp.path(), 6);

        let job_id = start_job(request(temp.path())).expect("job starts");
        let snapshot = wait_for_job(&job_id, WAIT).expect("job finishes");
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.files_processed, 6);
        assert_eq!(snapshot.total_files, 6);
        assert_eq!(snapshot.rows_processed, 12);
        assert_eq!(snapshot.runs, 1);

        let report = job_report(&job_id).expect("lookup").expect("report");
        assert!(!report.summary.is_partial_report);
        assert_eq!(report.duplicate_ids["same"].len(), 6);

        assert!(continue_job(&job_id).is_err());
        remove_job(&job_id).expect("remove");
        assert!(get_job(&job_id).is_err());
    }

    #[test]
    fn cancelled_job_can_be_continued() {
        let temp = TempDir::new().expect("tempdir");
        fixture(temp.path(), 40);

        let job_id = start_job(request(temp.path())).expect("job starts");
        let cancel = cancel_job(&job_id).expect("cancel");
        assert_eq!(cancel.job_id, job_id);
        let first = wait_for_job(&job_id, WAIT).expect("first run ends");
        assert!(first.cancel_requested);

        // The flag decides the status even if every source happened to finish.
        assert_eq!(first.status, JobStatus::Cancelled);
        let partial = job_report(&job_id).expect("lookup").expect("report");
        assert!(partial.summary.is_partial_report);
        assert_eq!(partial.summary.total_files, 40);

        let resumed = continue_job(&job_id).expect("continue");
        assert_eq!(
            resumed.remaining as u64,
            40 - partial.summary.files_processed
        );
        let done = wait_for_job(&job_id, WAIT).expect("continue ends");
        assert_eq!(done.status, JobStatus::Completed);
        assert!(!done.cancel_requested);

        let report = job_report(&job_id).expect("lookup").expect("report");
        assert_eq!(report.summary.files_processed, 40);
        assert_eq!(report.summary.total_key_occurrences, 80);
        assert_eq!(report.duplicate_ids["same"].len(), 40);
    }

    #[test]
    fn restart_rebuilds_engine_state() {
        let temp = TempDir::new().expect("tempdir");
        fixture(temp.path(), 4);

        let job_id = start_job(request(temp.path())).expect("job starts");
        wait_for_job(&job_id, WAIT).expect("first run");
        restart_job(&job_id).expect("restart");
        let snapshot = wait_for_job(&job_id, WAIT).expect("second run");

        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.runs, 1);
        let report = job_report(&job_id).expect("lookup").expect("report");
        // Fresh state: locations are not doubled by the second run.
        assert_eq!(report.duplicate_ids["same"].len(), 4);
        assert_eq!(report.summary.total_rows_processed, 8);
    }

    #[test]
    fn validation_job_reports_counts_only() {
        let temp = TempDir::new().expect("tempdir");
        fixture(temp.path(), 3);

        let job_id = start_job(JobRequest {
            validate_only: true,
            check_key: false,
            ..request(temp.path())
        })
        .expect("job starts");
        wait_for_job(&job_id, WAIT).expect("finishes");
        let report = job_report(&job_id).expect("lookup").expect("report");
        assert!(report.summary.is_validation_report);
        assert!(report.duplicate_ids.is_empty());
        assert_eq!(report.summary.total_key_occurrences, 6);
    }

    #[test]
    fn cloud_roots_without_a_directory_go_to_cloud_storage() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = closed.local_addr().expect("addr");
        drop(closed);
        std::env::set_var(dupe_analyser_core::EMULATOR_HOST_ENV, addr.to_string());

        let err = start_job(JobRequest {
            paths: vec!["gs://offline-bucket/data".to_string()],
            ..JobRequest::default()
        })
        .expect_err("bucket is unreachable");
        let message = format!("{err:#}");
        assert!(message.contains("source discovery failed"), "{message}");
        assert!(message.contains("offline-bucket"), "{message}");
    }

    #[test]
    fn request_fields_default_when_absent() {
        let request: JobRequest =
            serde_json::from_str(r#"{"paths":["/data"],"check_row":true}"#).expect("parse");
        assert_eq!(request.key, "id");
        assert_eq!(request.workers, 8);
        assert!(request.check_key);
        assert!(request.check_row);
        assert!(request.object_store_dir.is_none());
        assert!(request.engine_config().validate().is_ok());
    }

    #[test]
    fn discovery_failure_registers_nothing() {
        let temp = TempDir::new().expect("tempdir");
        let job_id = "missing-root-job".to_string();
        let err = start_job(JobRequest {
            job_id: Some(job_id.clone()),
            paths: vec![temp.path().join("nope").to_string_lossy().to_string()],
            ..JobRequest::default()
        })
        .expect_err("discovery fails");
        assert!(err.to_string().contains("discovery failed"));
        assert!(get_job(&job_id).is_err());
    }
}
