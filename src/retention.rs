//! Audit retention cleanup
//!
//! A regular supervised job whose body deletes audit records that finished
//! before `now - retention_window`. Its own executions are audited like
//! any other job's, so later runs eventually purge them too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::audit::{AuditFilter, AuditStore};
use crate::humanize::{HumanDuration, ParseError};
use crate::runner::{Job, JobBody, JobDescriptor, JobFailure};
use crate::schedule::{CronSchedule, ScheduleError};

pub const RETENTION_JOB_NAME: &str = "audit-retention";
/// Daily at midnight (UTC)
pub const DEFAULT_FREQUENCY: &str = "0 0 0 * * *";
pub const DEFAULT_RETENTION_WINDOW: &str = "7 days";

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Invalid retention frequency '{value}': {source}")]
    InvalidFrequency {
        value: String,
        #[source]
        source: ScheduleError,
    },

    #[error("Invalid retention window '{value}': {source}")]
    InvalidWindow {
        value: String,
        #[source]
        source: ParseError,
    },

    #[error("Retention window is too large: {0:?}")]
    WindowOutOfRange(Duration),
}

/// Raw retention settings; each field falls back to its default on its own
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionOptions {
    pub frequency: Option<String>,
    pub retention_window: Option<String>,
}

/// Resolved retention settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub frequency: CronSchedule,
    pub retention_window: Duration,
}

impl RetentionPolicy {
    /// Resolve options, treating missing or blank fields as unset
    pub fn resolve(options: &RetentionOptions) -> Result<Self, RetentionError> {
        let frequency = non_blank(options.frequency.as_deref()).unwrap_or(DEFAULT_FREQUENCY);
        let window = non_blank(options.retention_window.as_deref()).unwrap_or(DEFAULT_RETENTION_WINDOW);

        let frequency = CronSchedule::parse(frequency).map_err(|source| {
            RetentionError::InvalidFrequency {
                value: frequency.to_string(),
                source,
            }
        })?;
        let retention_window = window
            .parse::<HumanDuration>()
            .map_err(|source| RetentionError::InvalidWindow {
                value: window.to_string(),
                source,
            })?
            .as_duration();
        chrono::Duration::from_std(retention_window)
            .map_err(|_| RetentionError::WindowOutOfRange(retention_window))?;

        Ok(Self {
            frequency,
            retention_window,
        })
    }

    /// Records finished strictly before this instant are expired
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        cutoff(now, self.retention_window)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Job body deleting expired audit records
pub struct RetentionJob {
    store: Arc<dyn AuditStore>,
    retention_window: Duration,
}

impl RetentionJob {
    pub fn new(store: Arc<dyn AuditStore>, retention_window: Duration) -> Self {
        Self {
            store,
            retention_window,
        }
    }
}

#[async_trait]
impl JobBody for RetentionJob {
    async fn run(&self) -> Result<String, JobFailure> {
        let cutoff = cutoff(Utc::now(), self.retention_window);
        let deleted = self
            .store
            .delete_many(AuditFilter::FinishedBefore(cutoff))
            .await
            .map_err(|e| JobFailure::new(format!("failed to delete expired audit records: {e}")))?;

        info!(deleted, cutoff = %cutoff, "Expired audit records deleted");
        Ok(format!("deleted {deleted} audit records"))
    }
}

/// Build the cleanup job, ready to be supervised and scheduled
pub fn build_retention_job(policy: &RetentionPolicy, store: Arc<dyn AuditStore>) -> Job {
    let descriptor = JobDescriptor::new(RETENTION_JOB_NAME, policy.frequency.clone());
    Job::new(
        descriptor,
        Arc::new(RetentionJob::new(store, policy.retention_window)),
    )
}
