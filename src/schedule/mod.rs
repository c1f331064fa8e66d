//! Schedule evaluation for supervised jobs
//!
//! Jobs are scheduled with cron expressions evaluated in UTC. Both the
//! six-field form with a leading seconds column (`sec min hour dom month dow`)
//! and the classic five-field form (seconds fixed at `0`) are accepted.
//!
//! ```rust
//! use cronledger::schedule::CronSchedule;
//!
//! let every_five_seconds: CronSchedule = "*/5 * * * * *".parse().unwrap();
//! let nightly: CronSchedule = "0 0 * * *".parse().unwrap();
//! assert_eq!(nightly.expression(), "0 0 * * *");
//! # let _ = every_five_seconds;
//! ```

mod cron;

pub use cron::{CronSchedule, ScheduleError};
