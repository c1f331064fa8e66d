//! Job definitions loaded from a directory of TOML files
//!
//! Each `*.toml` file defines one job:
//!
//! ```toml
//! name = "nightly-report"
//! schedule = "0 30 2 * * *"
//! command = ["/usr/local/bin/report", "--daily"]
//! working_dir = "/var/lib/reports"   # optional
//! time_warning = "10 minutes"        # optional
//!
//! [env]                              # optional
//! REPORT_FORMAT = "csv"
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::job::{Job, JobBody, JobDescriptor, JobFailure};
use crate::humanize::{HumanDuration, ParseError};
use crate::schedule::{CronSchedule, ScheduleError};

const DEFINITION_EXTENSION: &str = "toml";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job definition {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid schedule in {}: {source}", path.display())]
    InvalidSchedule {
        path: PathBuf,
        #[source]
        source: ScheduleError,
    },

    #[error("Invalid time_warning in {}: {source}", path.display())]
    InvalidTimeWarning {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Job definition {} has an empty name or command", path.display())]
    Incomplete { path: PathBuf },

    #[error("Duplicate job name '{name}' in {}", path.display())]
    DuplicateName { name: String, path: PathBuf },
}

/// On-disk shape of a job definition file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDefinition {
    pub name: String,
    pub schedule: String,
    pub command: Vec<String>,
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub time_warning: Option<String>,
}

impl JobDefinition {
    /// Validate and turn the definition into a runnable job
    pub fn into_job(self, path: &Path) -> Result<Job, LoadError> {
        let name = self.name.trim().to_string();
        let Some((program, args)) = self.command.split_first() else {
            return Err(LoadError::Incomplete { path: path.to_path_buf() });
        };
        if name.is_empty() || program.trim().is_empty() {
            return Err(LoadError::Incomplete { path: path.to_path_buf() });
        }

        let schedule = CronSchedule::parse(&self.schedule).map_err(|source| {
            LoadError::InvalidSchedule {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let mut descriptor = JobDescriptor::new(name, schedule);
        if let Some(raw) = &self.time_warning {
            let threshold = raw.parse::<HumanDuration>().map_err(|source| {
                LoadError::InvalidTimeWarning {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            descriptor = descriptor.with_time_warning(threshold.as_duration());
        }

        let body = CommandBody {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: self.working_dir,
            env: self.env,
        };

        Ok(Job::new(descriptor, Arc::new(body)))
    }
}

/// Job body that runs an external command; a non-zero exit is a failure
#[derive(Debug, Clone)]
pub struct CommandBody {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

#[async_trait]
impl JobBody for CommandBody {
    async fn run(&self) -> Result<String, JobFailure> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| JobFailure::new(format!("failed to spawn '{}': {}", self.program, e)))?;

        if output.status.success() {
            return Ok(format!("'{}' {}", self.program, output.status));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        match stderr.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(last_line) => Err(JobFailure::new(format!(
                "'{}' {}: {}",
                self.program,
                output.status,
                last_line.trim()
            ))),
            None => Err(JobFailure::new(format!("'{}' {}", self.program, output.status))),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LoadError {
    let path = path.to_path_buf();
    move |source| LoadError::Io { path, source }
}

/// Load every job definition in `directory`, ordered by file name.
///
/// An empty directory yields an empty list; deciding whether that is an
/// error is up to the caller.
pub fn load_job_definitions(directory: &Path) -> Result<Vec<Job>, LoadError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(directory).map_err(io_error(directory))? {
        let path = entry.map_err(io_error(directory))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == DEFINITION_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut names = HashSet::new();
    let mut jobs = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = std::fs::read_to_string(&path).map_err(io_error(&path))?;
        let definition: JobDefinition =
            toml::from_str(&contents).map_err(|source| LoadError::Parse {
                path: path.clone(),
                source,
            })?;

        let job = definition.into_job(&path)?;
        if !names.insert(job.name().to_string()) {
            return Err(LoadError::DuplicateName {
                name: job.name().to_string(),
                path,
            });
        }

        debug!(job = %job.name(), schedule = %job.descriptor().schedule, path = %path.display(), "Loaded job definition");
        jobs.push(job);
    }

    info!(count = jobs.len(), directory = %directory.display(), "Loaded job definitions");
    Ok(jobs)
}
