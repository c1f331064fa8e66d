use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Store-assigned identifier of an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Time-ordered id, so key order follows insertion order
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of one tick. Moves from `Pending` to a terminal state exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    #[serde(rename = "In Process")]
    Pending,
    Success,
    Failed,
}

impl AuditStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuditStatus::Pending)
    }
}

/// One row per job execution attempt (stored document shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    pub execution_duration_millis: Option<u64>,
    #[serde(rename = "lastStatus")]
    pub status: AuditStatus,
    pub error: Option<String>,
    pub next_scheduled_time: Option<DateTime<Utc>>,
}

impl AuditRecord {
    /// Record opened at tick start
    pub fn pending(
        name: impl Into<String>,
        start_time: DateTime<Utc>,
        next_scheduled_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            start_time,
            finish_time: None,
            execution_duration_millis: None,
            status: AuditStatus::Pending,
            error: None,
            next_scheduled_time,
        }
    }

    /// Merge a patch into this record. Finalized records are immutable, so
    /// the patch is ignored (and `false` returned) once a terminal status is set.
    pub fn apply(&mut self, patch: &AuditPatch) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        if let Some(finish_time) = patch.finish_time {
            self.finish_time = Some(finish_time);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(millis) = patch.execution_duration_millis {
            self.execution_duration_millis = Some(millis);
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        true
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditPatch {
    pub finish_time: Option<DateTime<Utc>>,
    pub status: Option<AuditStatus>,
    pub execution_duration_millis: Option<u64>,
    pub error: Option<String>,
}

impl AuditPatch {
    /// Patch closing a tick: failed when the scheduler reported an error
    pub fn completion(
        finish_time: DateTime<Utc>,
        elapsed_millis: u64,
        error: Option<String>,
    ) -> Self {
        let status = if error.is_some() {
            AuditStatus::Failed
        } else {
            AuditStatus::Success
        };

        Self {
            finish_time: Some(finish_time),
            status: Some(status),
            execution_duration_millis: Some(elapsed_millis),
            error,
        }
    }
}

/// Predicate for bulk deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditFilter {
    /// Records with a finish time strictly before the cutoff. Unfinished
    /// records never match.
    FinishedBefore(DateTime<Utc>),
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        match self {
            AuditFilter::FinishedBefore(cutoff) => {
                record.finish_time.is_some_and(|finished| finished < *cutoff)
            }
        }
    }
}
