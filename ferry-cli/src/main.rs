//! Ferry CLI
//!
//! Operator interface to the import scheduler: machines, imports, jobs and
//! the event log.

mod commands;
mod config;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry code import CLI", long_about = None)]
struct Cli {
    /// Scheduler URL
    #[arg(
        long,
        env = "FERRY_SCHEDULER_URL",
        default_value = "http://localhost:8080"
    )]
    scheduler_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        scheduler_url: cli.scheduler_url,
    };

    handle_command(cli.command, &config).await
}
