use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use sidebar_boot::cli::Cli;
use sidebar_boot::command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    command::run_dry_run(&cli).await
}
