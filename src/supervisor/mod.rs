//! Job lifecycle supervisor
//!
//! Turns the runner's lifecycle events into audit records. Each job's audit
//! state lives in a [`JobSlot`] owned by the supervisor and keyed by job
//! name; transitions are computed by [`JobSlot::advance`] and the resulting
//! store calls run on tracked background tasks, so the runner is never
//! blocked by storage latency.
//!
//! Storage failures are logged with the job name and operation, counted in
//! [`Metrics`], and absorbed. A tick whose start record was never written
//! (or was written too late) is simply not finalized.

mod state;

pub use state::{Effect, Input, JobSlot, JobState};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditPatch, AuditRecord, AuditStore, RecordId};
use crate::observability::Metrics;
use crate::runner::{Job, JobDescriptor, LifecycleEvent, LifecycleListener};

/// Observes job lifecycles and keeps their audit trail
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn AuditStore>,
    slots: Mutex<HashMap<String, JobSlot>>,
    tasks: TaskTracker,
    metrics: Metrics,
}

impl Supervisor {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                slots: Mutex::new(HashMap::new()),
                tasks: TaskTracker::new(),
                metrics: Metrics::new(),
            }),
        }
    }

    /// Subscribe to `job`'s lifecycle events.
    ///
    /// Subscriptions are not deduplicated; attach each job exactly once.
    pub fn attach(&self, job: &mut Job) {
        self.lock_slots().entry(job.name().to_string()).or_default();
        job.subscribe(Arc::new(self.clone()));
        debug!(job = %job.name(), "Supervisor attached");
    }

    /// Id of the audit record currently open for `job`
    pub fn runtime_id(&self, job: &str) -> Option<RecordId> {
        self.lock_slots().get(job).and_then(JobSlot::runtime_id)
    }

    pub fn state(&self, job: &str) -> Option<JobState> {
        self.lock_slots().get(job).map(|slot| slot.state)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Wait for every pending audit write to settle
    pub async fn drain(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, JobSlot>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance `job`'s slot and return the effects to perform
    fn transition(&self, job: &str, input: Input<'_>) -> Vec<Effect> {
        let mut slots = self.lock_slots();
        let slot = slots.entry(job.to_string()).or_default();
        let (next, effects) = slot.advance(input);
        *slot = next;
        effects
    }

    fn perform(&self, job: &JobDescriptor, event: &LifecycleEvent, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenRecord { tick } => self.open_record(job, event, tick),
                Effect::FinalizeRecord {
                    id,
                    error,
                    elapsed_ms,
                } => self.finalize_record(&job.name, id, error, elapsed_ms),
                Effect::SkipFinalize => {
                    debug!(job = %job.name, "No open audit record, skipping completion write");
                }
                Effect::Abandoned { tick, runtime_id } => {
                    warn!(
                        job = %job.name,
                        tick,
                        runtime_id = ?runtime_id,
                        "Tick started before the previous one completed, abandoning its audit record"
                    );
                }
                Effect::Orphaned { tick, id } => self.orphaned(&job.name, tick, id),
            }
        }
    }

    fn open_record(&self, job: &JobDescriptor, event: &LifecycleEvent, tick: u64) {
        let scheduled_for = match event {
            LifecycleEvent::TickStarted { scheduled_for, .. } => *scheduled_for,
            _ => Utc::now(),
        };
        let record = AuditRecord::pending(
            job.name.clone(),
            Utc::now(),
            next_scheduled_time(job, scheduled_for),
        );

        let supervisor = self.clone();
        let name = job.name.clone();
        self.inner.tasks.spawn(async move {
            let input = match supervisor.inner.store.insert(record).await {
                Ok(id) => {
                    debug!(job = %name, tick, runtime_id = %id, "Start record written");
                    Input::StartRecorded { tick, id }
                }
                Err(e) => {
                    error!(job = %name, tick, operation = "insert", error = %e, "Failed to write tick start record");
                    supervisor.inner.metrics.audit_write_failed();
                    Input::StartFailed { tick }
                }
            };

            for effect in supervisor.transition(&name, input) {
                if let Effect::Orphaned { tick, id } = effect {
                    supervisor.orphaned(&name, tick, id);
                }
            }
        });
    }

    fn finalize_record(&self, job: &str, id: RecordId, error: Option<String>, elapsed_ms: u64) {
        let patch = AuditPatch::completion(Utc::now(), elapsed_ms, error);
        let supervisor = self.clone();
        let name = job.to_string();
        self.inner.tasks.spawn(async move {
            match supervisor.inner.store.update(&id, patch).await {
                Ok(()) => debug!(job = %name, runtime_id = %id, "Completion record written"),
                Err(e) => {
                    error!(job = %name, runtime_id = %id, operation = "update", error = %e, "Failed to write tick completion record");
                    supervisor.inner.metrics.audit_write_failed();
                }
            }
        });
    }

    fn orphaned(&self, job: &str, tick: u64, id: RecordId) {
        warn!(
            job = %job,
            tick,
            runtime_id = %id,
            "Start record written after its tick completed, record stays pending"
        );
        self.inner.metrics.orphaned_start();
    }
}

/// The fire time after the one that triggered the current tick
fn next_scheduled_time(job: &JobDescriptor, scheduled_for: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let reference = scheduled_for - chrono::Duration::seconds(1);
    job.schedule
        .next_fire_times_after(reference, 2)
        .last()
        .copied()
}

impl LifecycleListener for Supervisor {
    fn on_event(&self, job: &JobDescriptor, event: &LifecycleEvent) {
        let metrics = &self.inner.metrics;
        match event {
            LifecycleEvent::TickStarted { error, .. } => {
                metrics.tick_started();
                info!(job = %job.name, "Tick started");
                if let Some(e) = error {
                    warn!(job = %job.name, error = %e, "Scheduler reported an error at tick start");
                }
            }
            LifecycleEvent::TickComplete {
                error, elapsed_ms, ..
            } => {
                metrics.tick_completed(error.is_some());
                match error {
                    Some(e) => error!(job = %job.name, elapsed_ms, error = %e, "Tick failed"),
                    None => info!(job = %job.name, elapsed_ms, "Tick completed"),
                }
            }
            LifecycleEvent::TimeWarning { threshold } => {
                metrics.time_warning();
                warn!(job = %job.name, threshold = ?threshold, "Job is taking longer than expected");
            }
            LifecycleEvent::OverlappingCall => {
                metrics.overlapping_call();
                warn!(
                    job = %job.name,
                    "Tick arrived before the previous tick completed, it was skipped"
                );
            }
        }

        let effects = self.transition(&job.name, Input::Lifecycle(event));
        self.perform(job, event, effects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditStatus, MemoryAuditStore};
    use crate::runner::{JobBody, JobFailure};
    use crate::schedule::CronSchedule;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;

    struct NoopBody;

    #[async_trait]
    impl JobBody for NoopBody {
        async fn run(&self) -> Result<String, JobFailure> {
            Ok(String::new())
        }
    }

    fn supervised(store: &Arc<MemoryAuditStore>) -> (Supervisor, Job) {
        let supervisor = Supervisor::new(store.clone());
        let descriptor = JobDescriptor::new("report", CronSchedule::parse("0 * * * * *").unwrap());
        let mut job = Job::new(descriptor, Arc::new(NoopBody));
        supervisor.attach(&mut job);
        (supervisor, job)
    }

    fn started() -> LifecycleEvent {
        LifecycleEvent::TickStarted {
            scheduled_for: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            error: None,
        }
    }

    fn completed(error: Option<&str>) -> LifecycleEvent {
        LifecycleEvent::TickComplete {
            error: error.map(String::from),
            result: None,
            elapsed_ms: 42,
        }
    }

    #[tokio::test]
    async fn test_successful_tick_updates_inserted_record() {
        let store = Arc::new(MemoryAuditStore::new());
        let (supervisor, job) = supervised(&store);

        job.emit(started());
        supervisor.drain().await;
        let id = supervisor.runtime_id("report").expect("start record written");

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, AuditStatus::Pending);
        assert_eq!(record.finish_time, None);
        assert_eq!(
            record.next_scheduled_time,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap())
        );

        job.emit(completed(None));
        supervisor.drain().await;

        assert_eq!(store.update_calls(), 1);
        let record = store.get(&id).unwrap();
        assert_eq!(record.status, AuditStatus::Success);
        assert!(record.finish_time.is_some());
        assert_eq!(record.execution_duration_millis, Some(42));
        assert_eq!(record.error, None);
        assert_eq!(supervisor.runtime_id("report"), None);
        assert_eq!(supervisor.state("report"), Some(JobState::Idle));
    }

    #[tokio::test]
    async fn test_failed_tick_records_error() {
        let store = Arc::new(MemoryAuditStore::new());
        let (supervisor, job) = supervised(&store);

        job.emit(started());
        supervisor.drain().await;
        let id = supervisor.runtime_id("report").unwrap();
        job.emit(completed(Some("exit status 2")));
        supervisor.drain().await;

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, AuditStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("exit status 2"));
        assert_eq!(supervisor.metrics().snapshot().ticks_failed, 1);
    }

    #[tokio::test]
    async fn test_start_error_still_opens_record() {
        let store = Arc::new(MemoryAuditStore::new());
        let (supervisor, job) = supervised(&store);

        job.emit(LifecycleEvent::TickStarted {
            scheduled_for: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            error: Some("clock skew detected".to_string()),
        });
        supervisor.drain().await;

        let id = supervisor.runtime_id("report").expect("start record written");
        let record = store.get(&id).unwrap();
        assert_eq!(record.status, AuditStatus::Pending);
        assert_eq!(record.error, None);

        job.emit(completed(None));
        supervisor.drain().await;

        assert_eq!(store.update_calls(), 1);
        let record = store.get(&id).unwrap();
        assert_eq!(record.status, AuditStatus::Success);
        assert!(record.finish_time.is_some());
        assert_eq!(supervisor.runtime_id("report"), None);
    }

    #[tokio::test]
    async fn test_failed_insert_skips_update() {
        let store = Arc::new(MemoryAuditStore::new());
        store.set_fail_inserts(true);
        let (supervisor, job) = supervised(&store);

        job.emit(started());
        supervisor.drain().await;
        assert_eq!(supervisor.runtime_id("report"), None);

        job.emit(completed(None));
        supervisor.drain().await;

        assert_eq!(store.insert_calls(), 1);
        assert_eq!(store.update_calls(), 0);
        assert!(store.is_empty());
        assert_eq!(supervisor.runtime_id("report"), None);
        assert_eq!(supervisor.metrics().snapshot().audit_write_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_insert_does_not_reuse_previous_id() {
        let store = Arc::new(MemoryAuditStore::new());
        let (supervisor, job) = supervised(&store);

        job.emit(started());
        supervisor.drain().await;
        let first = supervisor.runtime_id("report").unwrap();
        job.emit(completed(None));
        supervisor.drain().await;

        store.set_fail_inserts(true);
        job.emit(started());
        supervisor.drain().await;
        job.emit(completed(Some("late failure")));
        supervisor.drain().await;

        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.get(&first).unwrap().status, AuditStatus::Success);
    }

    #[tokio::test]
    async fn test_failed_update_is_absorbed() {
        let store = Arc::new(MemoryAuditStore::new());
        store.set_fail_updates(true);
        let (supervisor, job) = supervised(&store);

        job.emit(started());
        supervisor.drain().await;
        let id = supervisor.runtime_id("report").unwrap();
        job.emit(completed(None));
        supervisor.drain().await;

        assert_eq!(store.get(&id).unwrap().status, AuditStatus::Pending);
        assert_eq!(supervisor.runtime_id("report"), None);
        assert_eq!(supervisor.metrics().snapshot().audit_write_failures, 1);
    }

    #[tokio::test]
    async fn test_completion_before_slow_insert_resolves() {
        let store = Arc::new(MemoryAuditStore::new());
        store.set_insert_delay(Some(Duration::from_millis(100)));
        let (supervisor, job) = supervised(&store);

        job.emit(started());
        job.emit(completed(None));
        supervisor.drain().await;

        assert_eq!(store.update_calls(), 0);
        assert_eq!(store.len(), 1);
        let (_, record) = store.list().remove(0);
        assert_eq!(record.status, AuditStatus::Pending);
        assert_eq!(supervisor.runtime_id("report"), None);
        assert_eq!(supervisor.metrics().snapshot().orphaned_starts, 1);
    }

    #[tokio::test]
    async fn test_advisory_events_are_observational() {
        let store = Arc::new(MemoryAuditStore::new());
        let (supervisor, job) = supervised(&store);

        job.emit(started());
        supervisor.drain().await;
        let id = supervisor.runtime_id("report");
        let inserts = store.insert_calls();

        job.emit(LifecycleEvent::OverlappingCall);
        job.emit(LifecycleEvent::TimeWarning {
            threshold: Duration::from_secs(5),
        });
        supervisor.drain().await;

        assert_eq!(supervisor.runtime_id("report"), id);
        assert_eq!(store.insert_calls(), inserts);
        assert_eq!(store.update_calls(), 0);
        assert_eq!(store.delete_calls(), 0);

        let metrics = supervisor.metrics().snapshot();
        assert_eq!(metrics.overlapping_calls, 1);
        assert_eq!(metrics.time_warnings, 1);
    }

    #[tokio::test]
    async fn test_jobs_are_tracked_independently() {
        let store = Arc::new(MemoryAuditStore::new());
        let supervisor = Supervisor::new(store.clone());
        let schedule = CronSchedule::parse("* * * * * *").unwrap();
        let mut a = Job::new(JobDescriptor::new("a", schedule.clone()), Arc::new(NoopBody));
        let mut b = Job::new(JobDescriptor::new("b", schedule), Arc::new(NoopBody));
        supervisor.attach(&mut a);
        supervisor.attach(&mut b);

        a.emit(started());
        b.emit(started());
        supervisor.drain().await;
        let a_id = supervisor.runtime_id("a").unwrap();
        let b_id = supervisor.runtime_id("b").unwrap();
        assert_ne!(a_id, b_id);

        b.emit(completed(None));
        supervisor.drain().await;
        assert_eq!(supervisor.runtime_id("a"), Some(a_id));
        assert_eq!(store.get(&b_id).unwrap().status, AuditStatus::Success);
        assert_eq!(store.get(&a_id).unwrap().status, AuditStatus::Pending);
    }
}
