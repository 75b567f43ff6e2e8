//! Import command handlers
//!
//! Handles code import definitions: creation, listing, manual requests,
//! and the result history with its stored worker logs.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use ferry_client::SchedulerClient;
use ferry_core::domain::code_import::{CodeImport, ReviewStatus};
use ferry_core::domain::result::{ImportResult, ResultStatus};
use ferry_core::domain::source::{RcsType, TargetRcsType};
use ferry_core::dto::import::CreateCodeImport;

use crate::config::Config;
use crate::types::{parse_rcs_type, parse_target_rcs_type};

/// Import subcommands
#[derive(Subcommand)]
pub enum ImportCommands {
    /// Define a new import; its first job is due immediately
    Create {
        /// Hosted target name, e.g. ~alice/widget/+git/main
        target_name: String,

        /// Source version control system (bzr, bzr-svn, cvs, git)
        #[arg(short, long, value_parser = parse_rcs_type)]
        rcs_type: RcsType,

        /// Target version control system (bzr, git)
        #[arg(short, long, value_parser = parse_target_rcs_type, default_value = "bzr")]
        target: TargetRcsType,

        /// Source URL (all types except cvs)
        #[arg(short, long)]
        url: Option<String>,

        /// CVSROOT (cvs only)
        #[arg(long)]
        cvs_root: Option<String>,

        /// CVS module (cvs only)
        #[arg(long)]
        cvs_module: Option<String>,

        /// Seconds between successful runs
        #[arg(long)]
        update_interval: Option<i64>,
    },
    /// List all imports
    List,
    /// Get import details
    Show {
        /// Import ID
        id: i64,
    },
    /// Ask for an import to run as soon as possible
    Request {
        /// Import ID
        id: i64,

        /// Who is asking
        #[arg(long, env = "USER")]
        requested_by: String,
    },
    /// Show an import's results, newest first
    Results {
        /// Import ID
        id: i64,
    },
    /// Print the worker log stored with a result
    Log {
        /// Import ID
        id: i64,

        /// Result ID; the latest result with a log when omitted
        #[arg(long)]
        result: Option<i64>,
    },
}

/// Handle import commands
pub async fn handle_import_command(command: ImportCommands, config: &Config) -> Result<()> {
    let client = SchedulerClient::new(&config.scheduler_url);

    match command {
        ImportCommands::Create {
            target_name,
            rcs_type,
            target,
            url,
            cvs_root,
            cvs_module,
            update_interval,
        } => {
            let req = CreateCodeImport {
                target_name,
                rcs_type,
                target_rcs_type: target,
                url,
                cvs_root,
                cvs_module,
                update_interval,
            };
            let import = client
                .create_import(req)
                .await
                .context("Failed to create import")?;
            println!(
                "{} Created import {}",
                "✓".green(),
                import.id.to_string().bold()
            );
            println!();
            print_import_details(&import);
            Ok(())
        }
        ImportCommands::List => list_imports(&client).await,
        ImportCommands::Show { id } => {
            let import = client.get_import(id).await?;
            print_import_details(&import);
            Ok(())
        }
        ImportCommands::Request { id, requested_by } => {
            let job = client.request_import(id, &requested_by).await?;
            println!(
                "{} Import {} requested; job {} is due now",
                "✓".green(),
                id,
                job.id.to_string().bold()
            );
            Ok(())
        }
        ImportCommands::Results { id } => list_results(&client, id).await,
        ImportCommands::Log { id, result } => show_log(&client, id, result).await,
    }
}

async fn list_imports(client: &SchedulerClient) -> Result<()> {
    let imports = client.list_imports().await?;

    if imports.is_empty() {
        println!("{}", "No imports found.".yellow());
    } else {
        println!("{}", format!("Found {} import(s):", imports.len()).bold());
        println!();
        for import in imports {
            println!(
                "  {} {} {}",
                "▸".cyan(),
                import.id.to_string().bold(),
                import.target_name
            );
            println!(
                "    {} from {}  {}",
                import.rcs_type,
                source_of(&import).dimmed(),
                colorize_review(&import.review_status)
            );
            println!();
        }
    }

    Ok(())
}

async fn list_results(client: &SchedulerClient, id: i64) -> Result<()> {
    let results = client.list_results(id).await?;

    if results.is_empty() {
        println!("{}", format!("No results for import {}.", id).yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("{} result(s) for import {}:", results.len(), id).bold()
    );
    println!();
    for result in results {
        print_result(&result);
    }

    Ok(())
}

async fn show_log(client: &SchedulerClient, id: i64, result_id: Option<i64>) -> Result<()> {
    let import = client.get_import(id).await?;
    let results = client.list_results(id).await?;

    let result = match result_id {
        Some(result_id) => results
            .iter()
            .find(|r| r.id == result_id)
            .with_context(|| format!("Import {} has no result {}", id, result_id))?,
        None => results
            .iter()
            .find(|r| r.log_file.is_some())
            .with_context(|| format!("Import {} has no stored logs", id))?,
    };

    let alias = result
        .log_file
        .with_context(|| format!("Result {} has no stored log", result.id))?;
    let url = format!(
        "{}/librarian/{}/{}",
        client.base_url(),
        alias,
        import.log_file_name()
    );
    let contents = client.download_log_file(&url).await?;

    println!(
        "{}",
        format!("Log for result {} ({}):", result.id, result.status).bold()
    );
    println!("{}", "─".repeat(80).dimmed());
    print!("{}", contents);
    println!("{}", "─".repeat(80).dimmed());

    Ok(())
}

fn source_of(import: &CodeImport) -> String {
    match (&import.url, &import.cvs_root, &import.cvs_module) {
        (Some(url), _, _) => url.clone(),
        (None, Some(root), Some(module)) => format!("{} {}", root, module),
        _ => "-".to_string(),
    }
}

fn print_import_details(import: &CodeImport) {
    println!("{}", "Import Details:".bold());
    println!("  ID:              {}", import.id.to_string().cyan());
    println!("  Target:          {}", import.target_name);
    println!(
        "  Type:            {} into {}",
        import.rcs_type, import.target_rcs_type
    );
    println!("  Source:          {}", source_of(import));
    println!("  Status:          {}", colorize_review(&import.review_status));
    println!(
        "  Update Interval: {}s",
        import.effective_update_interval().num_seconds()
    );
    println!(
        "  Created:         {}",
        import.date_created.format("%Y-%m-%d %H:%M:%S")
    );
    match import.date_last_successful {
        Some(date) => println!("  Last Success:    {}", date.format("%Y-%m-%d %H:%M:%S")),
        None => println!("  Last Success:    {}", "never".dimmed()),
    }
}

fn print_result(result: &ImportResult) {
    println!(
        "  {} Result {}  {}",
        "▸".cyan(),
        result.id.to_string().bold(),
        colorize_status(&result.status)
    );
    println!(
        "    Finished: {}",
        result
            .date_created
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(started) = result.date_job_started {
        let seconds = result
            .date_created
            .signed_duration_since(started)
            .num_seconds();
        println!("    Duration: {}s", seconds);
    }
    if let Some(machine) = &result.machine {
        println!("    Machine:  {}", machine.dimmed());
    }
    if result.log_file.is_some() {
        println!("    Log:      {}", "stored".green());
    }
    if let Some(excerpt) = &result.log_excerpt
        && !excerpt.is_empty()
    {
        println!("    Excerpt:");
        for line in excerpt.lines() {
            println!("      {}", line.dimmed());
        }
    }
    println!();
}

fn colorize_review(status: &ReviewStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    match status {
        ReviewStatus::Reviewed => status_str.green(),
        ReviewStatus::Suspended => status_str.yellow(),
        ReviewStatus::Failing => status_str.red(),
    }
}

fn colorize_status(status: &ResultStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    if status.is_success() {
        status_str.green()
    } else {
        match status {
            ResultStatus::Reclaimed | ResultStatus::Killed | ResultStatus::Interrupted => {
                status_str.yellow()
            }
            _ => status_str.red(),
        }
    }
}
