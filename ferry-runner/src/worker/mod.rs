//! Worker
//!
//! Runs one claimed job: fetches its parameters, picks a driver, runs it
//! while heartbeating, then uploads the log and reports the final status.
//!
//! If the scheduler stops recognising the job (it was reclaimed or
//! finished elsewhere), the import is abandoned and nothing is reported.

use anyhow::{Context, Result};
use chrono::Utc;
use ferry_client::ImportData;
use ferry_core::domain::result::ResultStatus;
use ferry_core::domain::source::SourceDetails;
use std::future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::driver::{ImportDriver, driver_for};
use crate::repository::JobRepository;
use crate::service::{AccessPolicy, AccessPolicyKind, HEARTBEAT_TAIL_LINES, LogCapture};

/// How a worker run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The job was finished with this status
    Finished(ResultStatus),
    /// The scheduler had no such job when the worker started
    Vanished,
    /// The job disappeared while the import was running
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Execution {
    Done(ResultStatus),
    Aborted,
}

pub struct Worker {
    jobs: Arc<dyn JobRepository>,
    access_policy: AccessPolicyKind,
    heartbeat_interval: Duration,
    job_timeout: Option<Duration>,
    working_directory_root: PathBuf,
    log_copy: Option<PathBuf>,
}

impl Worker {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        config: &Config,
        access_policy: AccessPolicyKind,
    ) -> Self {
        Self {
            jobs,
            access_policy,
            heartbeat_interval: config.heartbeat_interval,
            job_timeout: config.job_timeout,
            working_directory_root: config.working_directory_root.clone(),
            log_copy: None,
        }
    }

    /// Also append the import's output to `path` when the job ends
    pub fn with_log_copy(mut self, path: PathBuf) -> Self {
        self.log_copy = Some(path);
        self
    }

    /// Runs job `job_id` to completion
    ///
    /// Returns an error only when the scheduler could not be reached or the
    /// final status could not be delivered.
    pub async fn run(&self, job_id: i64) -> Result<WorkerOutcome> {
        let data = match self.jobs.get_import_data(job_id).await {
            Ok(data) => data,
            Err(e) if e.is_no_such_job() => {
                info!("Job {} no longer exists, nothing to do", job_id);
                return Ok(WorkerOutcome::Vanished);
            }
            Err(e) => return Err(e).context("Failed to fetch import data"),
        };

        let log = LogCapture::new();
        log.push_line(format!(
            "Job {} importing into {} started at {}",
            job_id,
            data.target_url,
            Utc::now().to_rfc3339()
        ));

        let status = match self.prepare(&data, &log) {
            Err(status) => status,
            Ok(driver) => {
                info!("Running {} import for job {}", driver.kind(), job_id);
                match self.execute(job_id, driver.as_ref(), &log).await {
                    Execution::Done(status) => status,
                    Execution::Aborted => return Ok(WorkerOutcome::Aborted),
                }
            }
        };

        log.push_line(format!("Import finished with status {}", status));
        self.report(job_id, &data.log_file_name, &log, status)
            .await?;

        info!("Job {} finished with status {}", job_id, status);
        Ok(WorkerOutcome::Finished(status))
    }

    /// Resolves the driver, or the status to report without running one
    fn prepare(
        &self,
        data: &ImportData,
        log: &LogCapture,
    ) -> std::result::Result<Box<dyn ImportDriver>, ResultStatus> {
        let details = SourceDetails::from_arguments(&data.arguments).map_err(|e| {
            error!("Invalid import arguments {:?}: {}", data.arguments, e);
            log.push_line(format!("Invalid import arguments: {}", e));
            ResultStatus::FailureInvalid
        })?;

        let driver = driver_for(&details, &data.target_url).map_err(|e| {
            error!("{}", e);
            log.push_line(e.to_string());
            ResultStatus::FailureUnsupportedFeature
        })?;

        // CVS roots are not URLs and are not policed
        if let Some(url) = details.url() {
            let policy = AccessPolicy::new(self.access_policy, &data.blacklisted_hostnames);
            if let Err(reason) = policy.check(url) {
                warn!("Refusing to import from {}: {}", url, reason);
                log.push_line(format!("Forbidden source URL: {}", reason));
                return Err(ResultStatus::FailureForbidden);
            }
        }

        Ok(driver)
    }

    /// Runs the driver in a scratch directory, heartbeating until it ends,
    /// the job vanishes, or the timeout passes
    async fn execute(&self, job_id: i64, driver: &dyn ImportDriver, log: &LogCapture) -> Execution {
        let work_dir = self.working_directory_root.join(format!("job-{}", job_id));
        if let Err(e) = tokio::fs::create_dir_all(&work_dir).await {
            error!(
                "Failed to create working directory {}: {}",
                work_dir.display(),
                e
            );
            log.push_line(format!("Failed to create working directory: {}", e));
            return Execution::Done(ResultStatus::Failure);
        }

        let timeout = async {
            match self.job_timeout {
                Some(limit) => time::sleep(limit).await,
                None => future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            status = driver.run(&work_dir, log) => Execution::Done(status),
            _ = timeout => {
                warn!("Job {} exceeded its time limit, killing the import", job_id);
                log.push_line("Import timed out and was killed");
                Execution::Done(ResultStatus::Killed)
            }
            _ = self.heartbeat_loop(job_id, log) => {
                warn!("Job {} was taken away, killing the import", job_id);
                Execution::Aborted
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(
                "Failed to remove working directory {}: {}",
                work_dir.display(),
                e
            );
        }

        outcome
    }

    /// Heartbeats forever; returns once the scheduler no longer knows the job
    async fn heartbeat_loop(&self, job_id: i64, log: &LogCapture) {
        let mut ticker = time::interval(self.heartbeat_interval);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match self
                .jobs
                .update_heartbeat(job_id, &log.tail(HEARTBEAT_TAIL_LINES))
                .await
            {
                Ok(()) => debug!("Heartbeat sent for job {}", job_id),
                Err(e) if e.is_no_such_job() => return,
                Err(e) => warn!("Failed to send heartbeat for job {}: {}", job_id, e),
            }
        }
    }

    /// Uploads the log, then finishes the job
    async fn report(
        &self,
        job_id: i64,
        log_file_name: &str,
        log: &LogCapture,
        status: ResultStatus,
    ) -> Result<()> {
        let contents = log.contents();

        if let Some(path) = &self.log_copy
            && let Err(e) = append_to(path, &contents).await
        {
            warn!("Failed to write log copy to {}: {}", path.display(), e);
        }

        let alias_url = match self.jobs.upload_log(log_file_name, contents).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Failed to upload log for job {}: {}", job_id, e);
                None
            }
        };

        self.jobs
            .finish_job(job_id, status, alias_url)
            .await
            .with_context(|| format!("Failed to finish job {}", job_id))
    }
}

async fn append_to(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverKind;
    use async_trait::async_trait;
    use ferry_client::ClientError;
    use ferry_core::dto::rpc::FaultCode;
    use std::sync::Mutex;

    fn no_such_job() -> ClientError {
        ClientError::Fault {
            fault: FaultCode::NoSuchCodeImportJob,
            status: 404,
            message: "No running job".to_string(),
        }
    }

    /// Scheduler stand-in for one job
    #[derive(Default)]
    struct FakeJobs {
        data: Option<ImportData>,
        job_vanishes: bool,
        upload_fails: bool,
        finish_fails: bool,
        heartbeats: Mutex<Vec<String>>,
        uploads: Mutex<Vec<(String, String)>>,
        finished: Mutex<Vec<(i64, ResultStatus, Option<String>)>>,
    }

    impl FakeJobs {
        fn with_arguments(arguments: &[&str]) -> Self {
            Self {
                data: Some(ImportData {
                    arguments: arguments.iter().map(|a| a.to_string()).collect(),
                    target_url: "https://code.example.com/~alice/widget/+git/main".to_string(),
                    log_file_name: "alice-widget-+git-main.log".to_string(),
                    blacklisted_hostnames: vec!["internal.example.com".to_string()],
                }),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl JobRepository for FakeJobs {
        async fn get_import_data(&self, _job_id: i64) -> Result<ImportData, ClientError> {
            self.data.clone().ok_or_else(no_such_job)
        }

        async fn update_heartbeat(&self, _job_id: i64, log_tail: &str) -> Result<(), ClientError> {
            if self.job_vanishes {
                return Err(no_such_job());
            }
            self.heartbeats.lock().unwrap().push(log_tail.to_string());
            Ok(())
        }

        async fn upload_log(&self, filename: &str, content: String) -> Result<String, ClientError> {
            if self.upload_fails {
                return Err(ClientError::api_error(500, "disk full"));
            }
            self.uploads
                .lock()
                .unwrap()
                .push((filename.to_string(), content));
            Ok(format!("http://scheduler/librarian/1/{}", filename))
        }

        async fn finish_job(
            &self,
            job_id: i64,
            status: ResultStatus,
            log_file_alias_url: Option<String>,
        ) -> Result<(), ClientError> {
            if self.finish_fails {
                return Err(ClientError::api_error(503, "unavailable"));
            }
            self.finished
                .lock()
                .unwrap()
                .push((job_id, status, log_file_alias_url));
            Ok(())
        }
    }

    /// Driver that writes a line, then waits
    struct SlowDriver {
        delay: Duration,
        status: ResultStatus,
    }

    #[async_trait]
    impl ImportDriver for SlowDriver {
        fn kind(&self) -> DriverKind {
            DriverKind::GitToGit
        }

        async fn run(&self, _work_dir: &Path, log: &LogCapture) -> ResultStatus {
            log.push_line("working");
            time::sleep(self.delay).await;
            self.status
        }
    }

    fn worker(jobs: Arc<FakeJobs>, job_timeout: Option<Duration>) -> Worker {
        let config = Config {
            heartbeat_interval: Duration::from_millis(20),
            job_timeout,
            working_directory_root: std::env::temp_dir()
                .join(format!("ferry-work-{}", uuid::Uuid::new_v4())),
            ..Config::default()
        };
        Worker::new(jobs, &config, AccessPolicyKind::Default)
    }

    #[tokio::test]
    async fn test_vanished_job_is_not_finished() {
        let jobs = Arc::new(FakeJobs::default());

        let outcome = worker(jobs.clone(), None).run(11).await.unwrap();

        assert_eq!(outcome, WorkerOutcome::Vanished);
        assert!(jobs.finished.lock().unwrap().is_empty());
        assert!(jobs.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blacklisted_source_is_forbidden() {
        let jobs = Arc::new(FakeJobs::with_arguments(&[
            "~alice/widget/+git/main",
            "git:git",
            "https://git.internal.example.com/widget.git",
        ]));

        let outcome = worker(jobs.clone(), None).run(12).await.unwrap();

        assert_eq!(
            outcome,
            WorkerOutcome::Finished(ResultStatus::FailureForbidden)
        );
        let finished = jobs.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].0, 12);
        assert_eq!(finished[0].1, ResultStatus::FailureForbidden);
        assert_eq!(
            finished[0].2.as_deref(),
            Some("http://scheduler/librarian/1/alice-widget-+git-main.log")
        );

        let uploads = jobs.uploads.lock().unwrap();
        assert_eq!(uploads[0].0, "alice-widget-+git-main.log");
        assert!(uploads[0].1.contains("host git.internal.example.com is blacklisted"));
    }

    #[tokio::test]
    async fn test_unsupported_pairing() {
        let jobs = Arc::new(FakeJobs::with_arguments(&[
            "~alice/widget/main",
            "cvs:git",
            ":pserver:anon@cvs.example.org:/cvs",
            "widget",
        ]));

        let outcome = worker(jobs.clone(), None).run(13).await.unwrap();

        assert_eq!(
            outcome,
            WorkerOutcome::Finished(ResultStatus::FailureUnsupportedFeature)
        );
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_invalid() {
        let jobs = Arc::new(FakeJobs::with_arguments(&["~alice/widget/main"]));

        let outcome = worker(jobs.clone(), None).run(14).await.unwrap();

        assert_eq!(outcome, WorkerOutcome::Finished(ResultStatus::FailureInvalid));
    }

    #[tokio::test]
    async fn test_failed_upload_still_finishes() {
        let mut fake = FakeJobs::with_arguments(&["~alice/widget/main"]);
        fake.upload_fails = true;
        let jobs = Arc::new(fake);

        worker(jobs.clone(), None).run(15).await.unwrap();

        let finished = jobs.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert!(finished[0].2.is_none());
    }

    #[tokio::test]
    async fn test_undeliverable_finish_is_an_error() {
        let mut fake = FakeJobs::with_arguments(&["~alice/widget/main"]);
        fake.finish_fails = true;

        let result = worker(Arc::new(fake), None).run(16).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_heartbeats_carry_the_log_tail() {
        let jobs = Arc::new(FakeJobs::default());
        let driver = SlowDriver {
            delay: Duration::from_millis(150),
            status: ResultStatus::SuccessNochange,
        };
        let log = LogCapture::new();

        let outcome = worker(jobs.clone(), None)
            .execute(21, &driver, &log)
            .await;

        assert_eq!(outcome, Execution::Done(ResultStatus::SuccessNochange));
        let heartbeats = jobs.heartbeats.lock().unwrap();
        assert!(!heartbeats.is_empty());
        assert_eq!(heartbeats[0], "working");
    }

    #[tokio::test]
    async fn test_vanishing_job_aborts_the_import() {
        let jobs = Arc::new(FakeJobs {
            job_vanishes: true,
            ..FakeJobs::default()
        });
        let driver = SlowDriver {
            delay: Duration::from_secs(30),
            status: ResultStatus::Success,
        };

        let outcome = time::timeout(
            Duration::from_secs(5),
            worker(jobs, None).execute(22, &driver, &LogCapture::new()),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Execution::Aborted);
    }

    #[tokio::test]
    async fn test_timeout_kills_the_import() {
        let jobs = Arc::new(FakeJobs::default());
        let driver = SlowDriver {
            delay: Duration::from_secs(30),
            status: ResultStatus::Success,
        };
        let log = LogCapture::new();

        let outcome = worker(jobs, Some(Duration::from_millis(50)))
            .execute(23, &driver, &log)
            .await;

        assert_eq!(outcome, Execution::Done(ResultStatus::Killed));
        assert!(log.contents().contains("timed out"));
    }
}
