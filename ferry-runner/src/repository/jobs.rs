//! Jobs repository
//!
//! The worker's side of the job RPC: fetching import data, heartbeating,
//! uploading the log and finishing.

use async_trait::async_trait;
use ferry_client::{ClientError, ImportData, SchedulerClient};
use ferry_core::domain::result::ResultStatus;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_import_data(&self, job_id: i64) -> Result<ImportData, ClientError>;

    async fn update_heartbeat(&self, job_id: i64, log_tail: &str) -> Result<(), ClientError>;

    /// Stores the log and returns its alias URL
    async fn upload_log(&self, filename: &str, content: String) -> Result<String, ClientError>;

    async fn finish_job(
        &self,
        job_id: i64,
        status: ResultStatus,
        log_file_alias_url: Option<String>,
    ) -> Result<(), ClientError>;
}

#[async_trait]
impl JobRepository for SchedulerClient {
    async fn get_import_data(&self, job_id: i64) -> Result<ImportData, ClientError> {
        SchedulerClient::get_import_data(self, job_id).await
    }

    async fn update_heartbeat(&self, job_id: i64, log_tail: &str) -> Result<(), ClientError> {
        SchedulerClient::update_heartbeat(self, job_id, log_tail).await
    }

    async fn upload_log(&self, filename: &str, content: String) -> Result<String, ClientError> {
        let alias = self.upload_log_file(filename, content).await?;
        Ok(alias.url)
    }

    async fn finish_job(
        &self,
        job_id: i64,
        status: ResultStatus,
        log_file_alias_url: Option<String>,
    ) -> Result<(), ClientError> {
        SchedulerClient::finish_job(self, job_id, status, log_file_alias_url).await
    }
}
