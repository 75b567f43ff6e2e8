//! Job command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use ferry_client::SchedulerClient;
use ferry_core::domain::job::{Job, JobState};

use crate::config::Config;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// List all pending and running jobs
    List,
    /// Get job details, including its latest log tail
    Show {
        /// Job ID
        id: i64,
    },
}

/// Handle job commands
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);

    match command {
        JobCommands::List => list_jobs(&client).await,
        JobCommands::Show { id } => {
            let job = client.get_job(id).await?;
            print_job_details(&job);
            Ok(())
        }
    }
}

async fn list_jobs(client: &SchedulerClient) -> Result<()> {
    let jobs = client.list_jobs().await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_job_summary(&job);
        }
    }

    Ok(())
}

fn print_job_summary(job: &Job) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().bold());
    println!("    Import:   {}", job.code_import_id);
    println!("    State:    {}", colorize_state(&job.state));
    println!(
        "    Due:      {}",
        job.date_due
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(machine) = &job.machine {
        println!("    Machine:  {}", machine.dimmed());
    }
    println!();
}

fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:           {}", job.id.to_string().cyan());
    println!("  Import:       {}", job.code_import_id);
    println!("  State:        {}", colorize_state(&job.state));
    println!("  Created:      {}", job.date_created.format("%Y-%m-%d %H:%M:%S"));
    println!("  Due:          {}", job.date_due.format("%Y-%m-%d %H:%M:%S"));

    if let Some(requested_by) = &job.requested_by {
        println!("  Requested By: {}", requested_by);
    }
    if let Some(machine) = &job.machine {
        println!("  Machine:      {}", machine);
    }
    if let Some(started) = job.date_started {
        println!("  Started:      {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(heartbeat) = job.heartbeat {
        println!("  Heartbeat:    {}", heartbeat.format("%Y-%m-%d %H:%M:%S"));
    }

    if !job.logtail.is_empty() {
        println!("\n{}", "Log Tail:".bold());
        println!("{}", "─".repeat(80).dimmed());
        println!("{}", job.logtail);
        println!("{}", "─".repeat(80).dimmed());
    }
}

fn colorize_state(state: &JobState) -> colored::ColoredString {
    let state_str = state.to_string();
    match state {
        JobState::Pending => state_str.yellow(),
        JobState::Running => state_str.cyan(),
    }
}
