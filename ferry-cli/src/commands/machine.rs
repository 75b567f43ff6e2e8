//! Machine command handlers
//!
//! Registration and lifecycle changes for import machines.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use ferry_client::SchedulerClient;
use ferry_core::domain::machine::{Machine, MachineState, OfflineReason};
use ferry_core::dto::machine::RegisterMachine;

use crate::config::Config;

/// Machine subcommands
#[derive(Subcommand)]
pub enum MachineCommands {
    /// List all registered machines
    List,
    /// Register a machine; it starts OFFLINE
    Register {
        /// Machine hostname
        hostname: String,

        /// Seconds between worker heartbeats
        #[arg(long)]
        heartbeat_interval: Option<u32>,

        /// Most jobs the machine may run at once
        #[arg(long)]
        max_concurrent_jobs: Option<u32>,
    },
    /// Show a machine and its running job count
    Status {
        /// Machine hostname
        hostname: String,
    },
    /// Let a machine take jobs
    Online {
        /// Machine hostname
        hostname: String,
    },
    /// Stop handing out jobs; the machine goes offline once drained
    Quiesce {
        /// Machine hostname
        hostname: String,
    },
    /// Take a machine offline immediately
    Offline {
        /// Machine hostname
        hostname: String,
    },
}

/// Handle machine commands
pub async fn handle_machine_command(command: MachineCommands, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);

    match command {
        MachineCommands::List => list_machines(&client).await,
        MachineCommands::Register {
            hostname,
            heartbeat_interval,
            max_concurrent_jobs,
        } => {
            let machine = client
                .register_machine(RegisterMachine {
                    hostname,
                    heartbeat_interval,
                    max_concurrent_jobs,
                })
                .await?;
            println!(
                "{} Registered machine {}",
                "✓".green(),
                machine.hostname.bold()
            );
            println!();
            print_machine(&machine);
            Ok(())
        }
        MachineCommands::Status { hostname } => {
            let status = client.get_machine_status(&hostname).await?;
            print_machine(&status.machine);
            println!("    Running Jobs: {}", status.running_jobs);
            Ok(())
        }
        MachineCommands::Online { hostname } => {
            set_state(&client, &hostname, MachineState::Online, None).await
        }
        MachineCommands::Quiesce { hostname } => {
            set_state(&client, &hostname, MachineState::Quiescing, None).await
        }
        MachineCommands::Offline { hostname } => {
            set_state(
                &client,
                &hostname,
                MachineState::Offline,
                Some(OfflineReason::Stopped),
            )
            .await
        }
    }
}

/// List all registered machines
async fn list_machines(client: &SchedulerClient) -> Result<()> {
    let machines = client.list_machines().await?;

    if machines.is_empty() {
        println!("{}", "No machines registered.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} registered machine(s):", machines.len()).bold()
        );
        println!();
        for machine in machines {
            print_machine(&machine);
            println!();
        }
    }

    Ok(())
}

async fn set_state(
    client: &SchedulerClient,
    hostname: &str,
    state: MachineState,
    reason: Option<OfflineReason>,
) -> Result<()> {
    let machine = client.set_machine_state(hostname, state, reason).await?;
    println!(
        "{} Machine {} is now {}",
        "✓".green(),
        machine.hostname.bold(),
        colorize_state(&machine.state)
    );
    Ok(())
}

fn print_machine(machine: &Machine) {
    println!("  {} Machine {}", "▸".cyan(), machine.hostname.bold());
    println!("    State:        {}", colorize_state(&machine.state));
    if let Some(reason) = machine.offline_reason {
        println!("    Reason:       {}", reason.to_string().dimmed());
    }
    println!("    Job Limit:    {}", machine.max_concurrent_jobs);
    println!("    Heartbeat:    every {}s", machine.heartbeat_interval);
    println!(
        "    Registered:   {}",
        machine
            .registered_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
}

fn colorize_state(state: &MachineState) -> colored::ColoredString {
    let state_str = state.to_string();
    match state {
        MachineState::Online => state_str.green(),
        MachineState::Quiescing => state_str.yellow(),
        MachineState::Offline => state_str.red(),
    }
}
