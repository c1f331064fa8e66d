use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::events::LifecycleEvent;
use super::job::Job;
use super::loader::{LoadError, load_job_definitions};

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Loads job definitions and drives their ticks
pub trait JobRunner: Send + Sync {
    fn load_jobs(&self, directory: &Path) -> Result<Vec<Job>, LoadError>;

    /// Start ticking every job. Must be called from within a Tokio runtime.
    fn start_jobs(&self, jobs: Vec<Job>) -> SchedulerHandle;
}

/// Cron-driven runner: one task per job, ticks never overlap per job
#[derive(Debug, Clone)]
pub struct CronRunner {
    drain_timeout: Duration,
}

impl CronRunner {
    pub fn new() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Upper bound on how long shutdown waits for in-flight ticks
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }
}

impl Default for CronRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner for CronRunner {
    fn load_jobs(&self, directory: &Path) -> Result<Vec<Job>, LoadError> {
        load_job_definitions(directory)
    }

    fn start_jobs(&self, jobs: Vec<Job>) -> SchedulerHandle {
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        info!(jobs = jobs.len(), "Starting job scheduler");
        for job in jobs {
            tracker.spawn(drive_job(Arc::new(job), shutdown.clone(), tracker.clone()));
        }

        SchedulerHandle {
            shutdown,
            tracker,
            drain_timeout: self.drain_timeout,
        }
    }
}

/// Fire ticks for one job until shutdown
async fn drive_job(job: Arc<Job>, shutdown: CancellationToken, tracker: TaskTracker) {
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut last_fire: Option<DateTime<Utc>> = None;
    info!(job = %job.name(), schedule = %job.descriptor().schedule, "Job scheduled");

    loop {
        let now = Utc::now();
        // Never fire the same slot twice if the wall clock lags the timer
        let reference = last_fire.map_or(now, |fired| fired.max(now));
        let Some(next) = job.descriptor().schedule.next_after(reference) else {
            warn!(job = %job.name(), "Schedule has no upcoming fire time, job will not run again");
            return;
        };

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(job = %job.name(), next = %next, "Waiting for next tick");

        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(job = %job.name(), "Job loop stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }
        last_fire = Some(next);

        if in_flight.swap(true, Ordering::AcqRel) {
            job.emit(LifecycleEvent::OverlappingCall);
            continue;
        }

        job.emit(LifecycleEvent::TickStarted {
            scheduled_for: next,
            error: None,
        });
        tracker.spawn(run_tick(Arc::clone(&job), Arc::clone(&in_flight)));
    }
}

/// Run one tick of the job body and report its completion
async fn run_tick(job: Arc<Job>, in_flight: Arc<AtomicBool>) {
    let started = Instant::now();
    let body = job.body();
    // The body runs on its own task so a panic surfaces as a failed tick
    let mut run = tokio::spawn(async move { body.run().await });

    let outcome = match job.descriptor().time_warning {
        Some(threshold) => {
            tokio::select! {
                outcome = &mut run => outcome,
                _ = tokio::time::sleep(threshold) => {
                    job.emit(LifecycleEvent::TimeWarning { threshold });
                    (&mut run).await
                }
            }
        }
        None => run.await,
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let (error, result) = match outcome {
        Ok(Ok(summary)) => (None, Some(summary)),
        Ok(Err(failure)) => (Some(failure.to_string()), None),
        Err(join_error) => (Some(format!("job body panicked: {}", join_error)), None),
    };

    job.emit(LifecycleEvent::TickComplete {
        error,
        result,
        elapsed_ms,
    });
    in_flight.store(false, Ordering::Release);
}

/// Running scheduler; dropping it leaves the jobs running
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    drain_timeout: Duration,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop scheduling new ticks and wait (bounded) for in-flight ticks.
    /// Running ticks are never cancelled.
    pub async fn shutdown(self) {
        info!("Stopping job scheduler");
        self.shutdown.cancel();
        self.tracker.close();

        if tokio::time::timeout(self.drain_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.drain_timeout,
                "In-flight ticks did not finish before the drain timeout"
            );
        } else {
            info!("Job scheduler stopped");
        }
    }
}
