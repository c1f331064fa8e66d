use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::events::{LifecycleEvent, LifecycleListener};
use crate::schedule::CronSchedule;

/// Failure reported by a job body; recorded verbatim in the audit trail
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct JobFailure(pub String);

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The work performed on every tick
#[async_trait]
pub trait JobBody: Send + Sync {
    /// Run once. The returned summary is reported with the completion event.
    async fn run(&self) -> Result<String, JobFailure>;
}

/// Identity and timing of a schedulable job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub name: String,
    pub schedule: CronSchedule,
    /// Raise `TimeWarning` when a tick runs longer than this
    pub time_warning: Option<Duration>,
}

impl JobDescriptor {
    pub fn new(name: impl Into<String>, schedule: CronSchedule) -> Self {
        Self {
            name: name.into(),
            schedule,
            time_warning: None,
        }
    }

    pub fn with_time_warning(mut self, threshold: Duration) -> Self {
        self.time_warning = Some(threshold);
        self
    }
}

/// A job ready to be scheduled, with the listeners observing its lifecycle
pub struct Job {
    descriptor: JobDescriptor,
    body: Arc<dyn JobBody>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl Job {
    pub fn new(descriptor: JobDescriptor, body: Arc<dyn JobBody>) -> Self {
        Self {
            descriptor,
            body,
            listeners: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn body(&self) -> Arc<dyn JobBody> {
        Arc::clone(&self.body)
    }

    /// Register a listener. Listeners are not deduplicated.
    pub fn subscribe(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver an event to every listener in subscription order
    pub fn emit(&self, event: LifecycleEvent) {
        for listener in &self.listeners {
            listener.on_event(&self.descriptor, &event);
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("descriptor", &self.descriptor)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
