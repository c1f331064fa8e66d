use super::models::Config;
use crate::audit::partitions::is_valid_collection_name;
use crate::retention::{RetentionError, RetentionPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("jobs.directory must not be empty")]
    EmptyJobsDirectory,

    #[error("audit.path must not be empty")]
    EmptyAuditPath,

    #[error("Invalid audit collection name '{0}'")]
    InvalidCollection(String),

    #[error("jobs.drain_timeout must be positive")]
    ZeroDrainTimeout,

    #[error(transparent)]
    Retention(#[from] RetentionError),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_jobs(config)?;
    validate_audit(config)?;
    RetentionPolicy::resolve(&config.retention.options())?;
    Ok(())
}

fn validate_jobs(config: &Config) -> Result<(), ValidationError> {
    if config.jobs.directory.as_os_str().is_empty() {
        return Err(ValidationError::EmptyJobsDirectory);
    }
    if config.jobs.drain_timeout.as_duration().is_zero() {
        return Err(ValidationError::ZeroDrainTimeout);
    }
    Ok(())
}

fn validate_audit(config: &Config) -> Result<(), ValidationError> {
    if config.audit.path.as_os_str().is_empty() {
        return Err(ValidationError::EmptyAuditPath);
    }
    if !is_valid_collection_name(&config.audit.collection) {
        return Err(ValidationError::InvalidCollection(
            config.audit.collection.clone(),
        ));
    }
    Ok(())
}
