//! Event command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use ferry_client::SchedulerClient;
use ferry_core::domain::event::{EventType, ImportEvent};

use crate::config::Config;

/// Event subcommands
#[derive(Subcommand)]
pub enum EventCommands {
    /// List the most recent events, newest first
    List {
        /// Maximum number of events to show
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

/// Handle event commands
pub async fn handle_event_command(command: EventCommands, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);

    match command {
        EventCommands::List { limit } => {
            let events = client.list_events(limit).await?;
            if events.is_empty() {
                println!("{}", "No events recorded.".yellow());
            }
            for event in events {
                print_event(&event);
            }
            Ok(())
        }
    }
}

fn print_event(event: &ImportEvent) {
    let mut subject = Vec::new();
    if let Some(id) = event.code_import_id {
        subject.push(format!("import {}", id));
    }
    if let Some(machine) = &event.machine {
        subject.push(format!("on {}", machine));
    }

    print!(
        "{} {} {}",
        event
            .date_created
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed(),
        colorize_type(&event.event_type),
        subject.join(" ")
    );
    match &event.message {
        Some(message) => println!(" {}", message.dimmed()),
        None => println!(),
    }
}

fn colorize_type(event_type: &EventType) -> colored::ColoredString {
    let type_str = format!("{:<8}", event_type.to_string());
    match event_type {
        EventType::Create | EventType::Request => type_str.cyan(),
        EventType::Start | EventType::Online => type_str.green(),
        EventType::Finish => type_str.normal(),
        EventType::Reclaim | EventType::Offline => type_str.red(),
        EventType::Quiesce => type_str.yellow(),
    }
}
