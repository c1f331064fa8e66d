use chrono::{DateTime, Utc};
use std::time::Duration;

use super::job::JobDescriptor;

/// Lifecycle signals raised by the runner for each job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A tick began. `scheduled_for` is the fire time that triggered it.
    TickStarted {
        scheduled_for: DateTime<Utc>,
        error: Option<String>,
    },
    /// The tick's body returned (or panicked)
    TickComplete {
        error: Option<String>,
        result: Option<String>,
        elapsed_ms: u64,
    },
    /// The running tick passed its configured time threshold
    TimeWarning { threshold: Duration },
    /// A fire time arrived while the previous tick was still running; it was skipped
    OverlappingCall,
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::TickStarted { .. } => "TICK_STARTED",
            LifecycleEvent::TickComplete { .. } => "TICK_COMPLETE",
            LifecycleEvent::TimeWarning { .. } => "TIME_WARNING",
            LifecycleEvent::OverlappingCall => "OVERLAPPING_CALL",
        }
    }
}

/// Receives lifecycle events for the jobs it subscribed to.
///
/// Called inline on the runner's task, so implementations must return
/// promptly and hand any I/O off to their own tasks.
pub trait LifecycleListener: Send + Sync {
    fn on_event(&self, job: &JobDescriptor, event: &LifecycleEvent);
}
