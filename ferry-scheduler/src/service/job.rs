//! Job Service
//!
//! The four worker-facing RPC operations: claiming work, handing out import
//! parameters, heartbeats and finishing. Each delegates to exactly one store
//! operation so it commits as one transaction.

use chrono::Utc;
use ferry_core::domain::job::{Job, truncate_log_tail};
use ferry_core::domain::result::ResultStatus;
use ferry_core::dto::librarian::alias_id_from_url;
use ferry_core::dto::rpc::{FinishJobRequest, ImportData};

use crate::config::Config;
use crate::repository::{Claim, FinishJob, Finished, JobStore, LogFileStore, Store, StoreError};

/// Service error type
#[derive(Debug)]
pub enum JobError {
    /// No job with this id, or not in the state the operation needs
    NoSuchJob(i64),
    InvalidStatus(String),
    LogFileNotFound(String),
    ValidationError(String),
    StoreError(StoreError),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::StoreError(err)
    }
}

/// Claims the next due job for `hostname`
///
/// Returns 0 when the machine may not take work or nothing is due.
pub async fn get_job_for_machine(
    store: &dyn Store,
    hostname: &str,
    worker_limit: u32,
) -> Result<i64, JobError> {
    if hostname.trim().is_empty() {
        return Err(JobError::ValidationError(
            "hostname cannot be empty".to_string(),
        ));
    }

    match store.claim_job(hostname, worker_limit, Utc::now()).await? {
        Claim::Claimed(job_id) => {
            tracing::info!("Job {} claimed by {}", job_id, hostname);
            Ok(job_id)
        }
        Claim::Refused(state) => {
            tracing::debug!("Machine {} is {}, no job handed out", hostname, state);
            Ok(0)
        }
        Claim::WentOffline => {
            tracing::info!("Machine {} finished quiescing and is now OFFLINE", hostname);
            Ok(0)
        }
        Claim::NothingDue => {
            tracing::debug!("No jobs due for {}", hostname);
            Ok(0)
        }
    }
}

/// Parameters a worker needs to run `job_id`
pub async fn get_import_data(
    store: &dyn Store,
    config: &Config,
    job_id: i64,
) -> Result<ImportData, JobError> {
    let (_, import) = store
        .find_job_with_import(job_id)
        .await?
        .ok_or(JobError::NoSuchJob(job_id))?;

    Ok(ImportData {
        arguments: import.worker_arguments(),
        target_url: format!("{}/{}", config.hosted_base_url, import.target_name),
        log_file_name: import.log_file_name(),
        blacklisted_hostnames: config.blacklisted_hostnames.clone(),
    })
}

/// Records that the worker for `job_id` is alive
pub async fn update_heartbeat(
    store: &dyn Store,
    job_id: i64,
    log_tail: &str,
) -> Result<(), JobError> {
    let tail = truncate_log_tail(log_tail);

    if !store.update_heartbeat(job_id, tail, Utc::now()).await? {
        return Err(JobError::NoSuchJob(job_id));
    }

    tracing::debug!("Heartbeat for job {}", job_id);
    Ok(())
}

/// Finishes a RUNNING job with the status its worker reported
///
/// The status and log reference are checked before anything is touched, so
/// a rejected call leaves the job as it was.
pub async fn finish_job(
    store: &dyn Store,
    config: &Config,
    req: FinishJobRequest,
) -> Result<Finished, JobError> {
    let status: ResultStatus = req
        .status_name
        .parse()
        .map_err(|_| JobError::InvalidStatus(req.status_name.clone()))?;

    let log_file = match req.log_file_alias_url.as_deref() {
        None | Some("") => None,
        Some(url) => {
            let id = alias_id_from_url(url)
                .ok_or_else(|| JobError::LogFileNotFound(url.to_string()))?;
            store
                .find_log_file(id)
                .await?
                .ok_or_else(|| JobError::LogFileNotFound(url.to_string()))?;
            Some(id)
        }
    };

    let finished = store
        .finish_job(FinishJob {
            job_id: req.job_id,
            status,
            log_file,
            failure_limit: config.consecutive_failure_limit,
            now: Utc::now(),
        })
        .await?
        .ok_or(JobError::NoSuchJob(req.job_id))?;

    tracing::info!(
        "Job {} finished with status {} (result {})",
        req.job_id,
        status,
        finished.result.id
    );
    if finished.import_failing {
        tracing::warn!(
            "Import {} failed too many times in a row and is now FAILING",
            finished.result.code_import_id
        );
    }
    if finished.machine_offline {
        tracing::info!(
            "Machine {} finished quiescing and is now OFFLINE",
            finished.result.machine.as_deref().unwrap_or_default()
        );
    }

    Ok(finished)
}

/// Get a job by ID
pub async fn get_job(store: &dyn Store, id: i64) -> Result<Job, JobError> {
    store.find_job(id).await?.ok_or(JobError::NoSuchJob(id))
}

/// List all queued and running jobs
pub async fn list_jobs(store: &dyn Store) -> Result<Vec<Job>, JobError> {
    Ok(store.list_jobs().await?)
}
