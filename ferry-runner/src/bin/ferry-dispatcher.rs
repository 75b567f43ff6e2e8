//! ferry-dispatcher
//!
//! One dispatch pass for this machine. Meant to be run every minute or so
//! by cron or a systemd timer.

use anyhow::Result;
use clap::Parser;
use ferry_client::SchedulerClient;
use ferry_runner::config::Config;
use ferry_runner::dispatcher::{Dispatcher, ProcessLauncher};
use ferry_runner::service::AccessPolicyKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ferry-dispatcher")]
#[command(about = "Claim a pending import for this machine and start a worker", long_about = None)]
struct Args {
    /// Scheduler URL
    #[arg(long, env = "SCHEDULER_URL")]
    scheduler_url: Option<String>,

    /// Name this machine registers under
    #[arg(long)]
    hostname: Option<String>,

    /// Most jobs this machine runs at once
    #[arg(long)]
    worker_limit: Option<u32>,

    /// Worker program to start
    #[arg(long)]
    worker_binary: Option<PathBuf>,

    /// Access policy handed to workers
    #[arg(long, value_enum)]
    access_policy: Option<AccessPolicyKind>,

    /// Increase logging; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    ferry_runner::init_tracing(args.verbose, None)?;

    let mut config = Config::from_env();
    if let Some(url) = args.scheduler_url {
        config.scheduler_url = url;
    }
    if let Some(hostname) = args.hostname {
        config.hostname = Some(hostname);
    }
    if let Some(limit) = args.worker_limit {
        config.worker_limit = limit;
    }
    if let Some(binary) = args.worker_binary {
        config.worker_binary = binary;
    }
    config.validate()?;

    let hostname = config.resolve_hostname()?;
    info!(
        "Dispatching for {} (limit {}) against {}",
        hostname, config.worker_limit, config.scheduler_url
    );

    let client = Arc::new(SchedulerClient::new(config.scheduler_url.clone()));
    let launcher = Arc::new(ProcessLauncher::new(
        &config,
        args.verbose,
        args.access_policy,
    ));
    let dispatcher = Dispatcher::new(hostname, config.worker_limit, client, launcher);

    match dispatcher.dispatch_once().await {
        Ok(outcome) => {
            info!("Dispatch pass done: {}", outcome);
            Ok(())
        }
        Err(e) => {
            error!("Dispatch pass failed: {:#}", e);
            Err(e)
        }
    }
}
