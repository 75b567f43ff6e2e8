//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod event;
mod import;
mod job;
mod machine;

pub use event::EventCommands;
pub use import::ImportCommands;
pub use job::JobCommands;
pub use machine::MachineCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Import machine management
    Machine {
        #[command(subcommand)]
        command: MachineCommands,
    },
    /// Code import management
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Import jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Scheduler event log
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Machine { command } => machine::handle_machine_command(command, config).await,
        Commands::Import { command } => import::handle_import_command(command, config).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Event { command } => event::handle_event_command(command, config).await,
    }
}
