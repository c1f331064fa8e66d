use crate::humanize::HumanDuration;
use crate::retention::RetentionOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Where job definitions live and how they are run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    #[serde(default = "default_jobs_directory")]
    pub directory: PathBuf,
    /// How long shutdown waits for in-flight ticks
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: HumanDuration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            directory: default_jobs_directory(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_jobs_directory() -> PathBuf {
    PathBuf::from("config/jobs")
}

fn default_drain_timeout() -> HumanDuration {
    HumanDuration(Duration::from_secs(30))
}

/// Audit trail storage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Fjall keyspace directory
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
            collection: default_collection(),
        }
    }
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("data/audit")
}

fn default_collection() -> String {
    "CRON_LOGS".to_string()
}

/// Retention cleanup; unset fields use the built-in defaults
/// (daily at midnight, 7 days)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetentionConfig {
    pub frequency: Option<String>,
    pub retention_window: Option<String>,
}

impl RetentionConfig {
    pub fn options(&self) -> RetentionOptions {
        RetentionOptions {
            frequency: self.frequency.clone(),
            retention_window: self.retention_window.clone(),
        }
    }
}
