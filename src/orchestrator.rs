//! Bootstrap of the supervised job set
//!
//! Validates the inputs, loads the job definitions, appends the retention
//! cleanup job, attaches one [`Supervisor`] to every job and starts the
//! runner. Every failure here is fatal and returned to the caller.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::audit::{AuditBackend, AuditError};
use crate::retention::{RetentionError, RetentionOptions, RetentionPolicy, build_retention_job};
use crate::runner::{JobRunner, LoadError, SchedulerHandle};
use crate::supervisor::Supervisor;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid retention settings: {0}")]
    InvalidRetention(#[from] RetentionError),

    #[error("Failed to open audit collection '{collection}': {source}")]
    Store {
        collection: String,
        #[source]
        source: AuditError,
    },

    #[error("Failed to load jobs: {0}")]
    Load(#[from] LoadError),

    #[error("No job definitions found in {}", directory.display())]
    NoJobs { directory: PathBuf },

    #[error("Job name '{0}' is reserved or used twice")]
    DuplicateJobName(String),
}

/// A running, supervised job set
pub struct SupervisedJobs {
    supervisor: Supervisor,
    scheduler: SchedulerHandle,
    job_names: Vec<String>,
}

impl SupervisedJobs {
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Names of every scheduled job, the retention job last
    pub fn job_names(&self) -> &[String] {
        &self.job_names
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop ticking, let in-flight ticks finish, then settle pending audit writes
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.supervisor.drain().await;
        info!("Supervised jobs stopped");
    }
}

/// Load, supervise and start every job in `jobs_directory`, plus the
/// retention job for `collection_name`.
///
/// Must be called from within a Tokio runtime.
pub fn build_supervised_jobs(
    runner: &dyn JobRunner,
    backend: &dyn AuditBackend,
    jobs_directory: &Path,
    collection_name: &str,
    retention: &RetentionOptions,
) -> Result<SupervisedJobs, BootstrapError> {
    if jobs_directory.as_os_str().is_empty() {
        return Err(BootstrapError::MissingParameter("jobs directory"));
    }
    let collection_name = collection_name.trim();
    if collection_name.is_empty() {
        return Err(BootstrapError::MissingParameter("audit collection name"));
    }

    let policy = RetentionPolicy::resolve(retention)?;
    let store = backend
        .collection(collection_name)
        .map_err(|source| BootstrapError::Store {
            collection: collection_name.to_string(),
            source,
        })?;

    let mut jobs = runner.load_jobs(jobs_directory)?;
    if jobs.is_empty() {
        return Err(BootstrapError::NoJobs {
            directory: jobs_directory.to_path_buf(),
        });
    }
    jobs.push(build_retention_job(&policy, store.clone()));

    let mut names = HashSet::with_capacity(jobs.len());
    for job in &jobs {
        if !names.insert(job.name()) {
            return Err(BootstrapError::DuplicateJobName(job.name().to_string()));
        }
    }

    let supervisor = Supervisor::new(store);
    for job in &mut jobs {
        supervisor.attach(job);
    }

    let job_names: Vec<String> = jobs.iter().map(|job| job.name().to_string()).collect();
    info!(
        jobs = ?job_names,
        collection = %collection_name,
        retention_frequency = %policy.frequency,
        retention_window = ?policy.retention_window,
        "Starting supervised jobs"
    );
    let scheduler = runner.start_jobs(jobs);

    Ok(SupervisedJobs {
        supervisor,
        scheduler,
        job_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryBackend;
    use crate::retention::RETENTION_JOB_NAME;
    use crate::runner::{CronRunner, Job, JobBody, JobDescriptor, JobFailure};
    use crate::schedule::CronSchedule;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopBody;

    #[async_trait]
    impl JobBody for NoopBody {
        async fn run(&self) -> Result<String, JobFailure> {
            Ok(String::new())
        }
    }

    /// Runner returning canned jobs and counting calls
    #[derive(Default)]
    struct FakeRunner {
        job_names: Vec<&'static str>,
        loads: AtomicUsize,
        starts: AtomicUsize,
        listeners: std::sync::Mutex<Vec<usize>>,
    }

    impl FakeRunner {
        fn with_jobs(job_names: &[&'static str]) -> Self {
            Self {
                job_names: job_names.to_vec(),
                ..Self::default()
            }
        }
    }

    impl JobRunner for FakeRunner {
        fn load_jobs(&self, _directory: &Path) -> Result<Vec<Job>, LoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .job_names
                .iter()
                .map(|name| {
                    let schedule = CronSchedule::parse("0 0 * * * *").unwrap();
                    Job::new(JobDescriptor::new(*name, schedule), Arc::new(NoopBody))
                })
                .collect())
        }

        fn start_jobs(&self, jobs: Vec<Job>) -> SchedulerHandle {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.listeners.lock().unwrap() = jobs.iter().map(Job::listener_count).collect();
            // nothing fires hourly jobs within a test
            CronRunner::new().start_jobs(Vec::new())
        }
    }

    fn bootstrap(
        runner: &FakeRunner,
        directory: &str,
        collection: &str,
        retention: &RetentionOptions,
    ) -> Result<SupervisedJobs, BootstrapError> {
        build_supervised_jobs(
            runner,
            &MemoryBackend::new(),
            Path::new(directory),
            collection,
            retention,
        )
    }

    #[tokio::test]
    async fn test_missing_parameters_fail_before_loading() {
        let runner = FakeRunner::with_jobs(&["report"]);

        let result = bootstrap(&runner, "", "CRON_LOGS", &RetentionOptions::default());
        assert!(matches!(result, Err(BootstrapError::MissingParameter(_))));

        let result = bootstrap(&runner, "jobs", "  ", &RetentionOptions::default());
        assert!(matches!(result, Err(BootstrapError::MissingParameter(_))));

        assert_eq!(runner.loads.load(Ordering::SeqCst), 0);
        assert_eq!(runner.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_jobs_is_fatal() {
        let runner = FakeRunner::with_jobs(&[]);
        let result = bootstrap(&runner, "jobs/empty", "CRON_LOGS", &RetentionOptions::default());

        let err = result.err().expect("bootstrap must fail");
        assert!(matches!(&err, BootstrapError::NoJobs { .. }));
        assert!(err.to_string().contains("jobs/empty"));
        assert_eq!(runner.loads.load(Ordering::SeqCst), 1);
        assert_eq!(runner.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_error_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let result = build_supervised_jobs(
            &CronRunner::new(),
            &MemoryBackend::new(),
            &missing,
            "CRON_LOGS",
            &RetentionOptions::default(),
        );
        assert!(matches!(result, Err(BootstrapError::Load(LoadError::Io { .. }))));
    }

    #[tokio::test]
    async fn test_invalid_inputs_are_fatal() {
        let runner = FakeRunner::with_jobs(&["report"]);
        let retention = RetentionOptions {
            frequency: None,
            retention_window: Some("forever".to_string()),
        };
        let result = bootstrap(&runner, "jobs", "CRON_LOGS", &retention);
        assert!(matches!(result, Err(BootstrapError::InvalidRetention(_))));

        let result = bootstrap(&runner, "jobs", "bad name!", &RetentionOptions::default());
        assert!(matches!(result, Err(BootstrapError::Store { .. })));

        let runner = FakeRunner::with_jobs(&["report", RETENTION_JOB_NAME]);
        let result = bootstrap(&runner, "jobs", "CRON_LOGS", &RetentionOptions::default());
        assert!(matches!(result, Err(BootstrapError::DuplicateJobName(name)) if name == RETENTION_JOB_NAME));
        assert_eq!(runner.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_every_job_supervised_once_and_started() {
        let runner = FakeRunner::with_jobs(&["report", "backup"]);
        let jobs = bootstrap(&runner, "jobs", "CRON_LOGS", &RetentionOptions::default()).unwrap();

        assert_eq!(jobs.job_names(), ["report", "backup", RETENTION_JOB_NAME]);
        assert_eq!(*runner.listeners.lock().unwrap(), vec![1, 1, 1]);
        assert_eq!(runner.starts.load(Ordering::SeqCst), 1);
        assert!(jobs.is_running());
        assert_eq!(
            jobs.supervisor().state(RETENTION_JOB_NAME),
            Some(crate::supervisor::JobState::Idle)
        );

        jobs.shutdown().await;
    }
}
