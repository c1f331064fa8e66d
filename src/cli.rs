use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cronledger")]
#[command(about = "Scheduled job supervisor with an audit trail", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $CRONLEDGER_CONFIG or config/cronledger.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the job definitions and run them until interrupted
    Run(RunArgs),
    /// Print recorded executions as JSON lines, newest first
    History(HistoryArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Directory of job definition files
    #[arg(long)]
    pub jobs_dir: Option<PathBuf>,

    /// Audit collection to record executions in
    #[arg(long)]
    pub collection: Option<String>,

    /// Cron expression for the retention cleanup job
    #[arg(long)]
    pub retention_frequency: Option<String>,

    /// Age after which audit records are deleted, e.g. "7 days"
    #[arg(long)]
    pub retention_window: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct HistoryArgs {
    /// Audit collection to read
    #[arg(long)]
    pub collection: Option<String>,

    /// Only show executions of this job
    #[arg(long)]
    pub name: Option<String>,

    /// Maximum number of records to print
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
