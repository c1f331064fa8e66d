//! Job registry and runner
//!
//! Loads job definitions, fires their ticks on schedule and reports each
//! tick's lifecycle to subscribed listeners.
//!
//! ## Key Components
//!
//! - [`Job`] - descriptor, body and listeners of one schedulable unit
//! - [`JobBody`] - the work performed on every tick
//! - [`LifecycleEvent`] / [`LifecycleListener`] - tick lifecycle signals
//! - [`JobRunner`] - loads jobs and starts ticking them
//! - [`CronRunner`] - the Tokio implementation of [`JobRunner`]
//!
//! Ticks of the same job never overlap: a fire time that arrives while the
//! previous tick is still running is skipped and reported as
//! [`LifecycleEvent::OverlappingCall`]. Different jobs tick independently.

mod events;
mod job;
mod loader;
mod scheduler;

pub use events::{LifecycleEvent, LifecycleListener};
pub use job::{Job, JobBody, JobDescriptor, JobFailure};
pub use loader::{CommandBody, JobDefinition, LoadError, load_job_definitions};
pub use scheduler::{CronRunner, JobRunner, SchedulerHandle};
