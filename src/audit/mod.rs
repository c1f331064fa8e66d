//! Audit store gateway: durable history of job ticks
//!
//! Each tick of a supervised job produces one [`AuditRecord`]: inserted as
//! `In Process` when the tick starts and patched with its finish time,
//! duration and outcome when it completes. Records are grouped in named
//! collections:
//!
//! - [`FjallBackend`] keeps every collection as a partition of an embedded
//!   Fjall keyspace
//! - [`MemoryBackend`] keeps them in process memory
//!
//! Both expose collections through the [`AuditStore`] trait, which is all
//! the supervisor and the retention job depend on.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cronledger::audit::{AuditBackend, FjallBackend};
//!
//! let backend = FjallBackend::open("data/audit")?;
//! let store = backend.collection("CRON_LOGS")?;
//! let id = store.insert(record).await?;
//! ```

pub mod error;
pub mod memory;
pub mod partitions;
pub mod record;
pub mod store;

pub use error::{AuditError, Result};
pub use memory::{MemoryAuditStore, MemoryBackend};
pub use record::{AuditFilter, AuditPatch, AuditRecord, AuditStatus, RecordId};
pub use store::{AuditBackend, AuditStore, FjallAuditStore, FjallBackend};
