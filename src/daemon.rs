use cronledger::audit::{AuditRecord, FjallBackend, RecordId};
use cronledger::config::Config;
use cronledger::orchestrator::build_supervised_jobs;
use cronledger::runner::CronRunner;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::cli::{HistoryArgs, RunArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn load_config(path: Option<PathBuf>) -> Result<Config, AnyError> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

/// Run every job until SIGINT/SIGTERM, then drain and flush the audit store
pub async fn run(mut config: Config, args: RunArgs) -> Result<(), AnyError> {
    if let Some(directory) = args.jobs_dir {
        config.jobs.directory = directory;
    }
    if let Some(collection) = args.collection {
        config.audit.collection = collection;
    }
    if args.retention_frequency.is_some() {
        config.retention.frequency = args.retention_frequency;
    }
    if args.retention_window.is_some() {
        config.retention.retention_window = args.retention_window;
    }
    config.validate()?;

    let backend = FjallBackend::open(&config.audit.path)?;
    let runner = CronRunner::new().with_drain_timeout(config.jobs.drain_timeout.as_duration());
    let jobs = build_supervised_jobs(
        &runner,
        &backend,
        &config.jobs.directory,
        &config.audit.collection,
        &config.retention.options(),
    )?;
    info!(
        jobs = jobs.job_names().len(),
        audit_path = %config.audit.path.display(),
        "cronledger running"
    );

    shutdown_signal().await;

    let metrics = jobs.supervisor().metrics().snapshot();
    jobs.shutdown().await;
    backend.persist()?;
    info!(?metrics, "cronledger stopped");
    Ok(())
}

#[derive(Serialize)]
struct HistoryLine<'a> {
    id: RecordId,
    #[serde(flatten)]
    record: &'a AuditRecord,
}

/// Print the newest audit records of a collection as JSON lines
pub fn history(config: Config, args: HistoryArgs) -> Result<(), AnyError> {
    let collection = args.collection.unwrap_or(config.audit.collection);
    let backend = FjallBackend::open(&config.audit.path)?;
    let store = backend.open_collection(&collection)?;

    let mut records = store.list()?;
    if let Some(name) = &args.name {
        records.retain(|(_, record)| &record.name == name);
    }
    records.sort_by(|a, b| b.1.start_time.cmp(&a.1.start_time));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (id, record) in records.iter().take(args.limit) {
        let line = serde_json::to_string(&HistoryLine { id: *id, record })?;
        writeln!(out, "{line}")?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
