//! ferry-worker
//!
//! Runs a single import job. Started by `ferry-dispatcher`; exits non-zero
//! only if the scheduler could not be told how the job ended.

use anyhow::Result;
use clap::Parser;
use ferry_client::SchedulerClient;
use ferry_runner::config::Config;
use ferry_runner::service::AccessPolicyKind;
use ferry_runner::worker::{Worker, WorkerOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ferry-worker")]
#[command(about = "Run one code import job", long_about = None)]
struct Args {
    /// Job to run
    job_id: i64,

    /// Scheduler URL
    #[arg(long, env = "SCHEDULER_URL")]
    scheduler_url: Option<String>,

    /// File to append this worker's log to
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Which source URLs may be imported from
    #[arg(long, value_enum, default_value = "default")]
    access_policy: AccessPolicyKind,

    /// Increase logging; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    ferry_runner::init_tracing(args.verbose, args.log_file.as_deref())?;

    let mut config = Config::from_env();
    if let Some(url) = args.scheduler_url {
        config.scheduler_url = url;
    }
    config.validate()?;

    info!("Worker starting for job {}", args.job_id);

    let client = Arc::new(SchedulerClient::new(config.scheduler_url.clone()));
    let mut worker = Worker::new(client, &config, args.access_policy);
    if let Some(path) = args.log_file {
        worker = worker.with_log_copy(path);
    }

    match worker.run(args.job_id).await {
        Ok(WorkerOutcome::Finished(status)) => {
            info!("Job {} reported as {}", args.job_id, status);
            Ok(())
        }
        Ok(WorkerOutcome::Vanished) | Ok(WorkerOutcome::Aborted) => {
            info!("Job {} is no longer ours, exiting", args.job_id);
            Ok(())
        }
        Err(e) => {
            error!("Job {} could not be reported: {:#}", args.job_id, e);
            Err(e)
        }
    }
}
