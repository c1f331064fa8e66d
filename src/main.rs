mod cli;
mod daemon;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = daemon::load_config(cli.config)?;

    match cli.command {
        Commands::Run(args) => daemon::run(config, args).await?,
        Commands::History(args) => daemon::history(config, args)?,
    }

    Ok(())
}
