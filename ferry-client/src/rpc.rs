//! Worker-facing RPC calls

use crate::SchedulerClient;
use crate::error::Result;
use ferry_core::domain::result::ResultStatus;
use ferry_core::dto::rpc::{
    FinishJobRequest, HeartbeatRequest, ImportData, ImportDataRequest, JobForMachineRequest,
    JobForMachineResponse,
};

impl SchedulerClient {
    // =============================================================================
    // Job Runner RPC
    // =============================================================================

    /// Ask for the next due job on behalf of `hostname`
    ///
    /// # Returns
    /// The claimed job id, or 0 when the machine should not start anything
    pub async fn get_job_for_machine(&self, hostname: &str, worker_limit: u32) -> Result<i64> {
        let url = format!("{}/rpc/getJobForMachine", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&JobForMachineRequest {
                hostname: hostname.to_string(),
                worker_limit,
            })
            .send()
            .await?;

        let body: JobForMachineResponse = self.handle_response(response).await?;
        Ok(body.job_id)
    }

    /// Fetch the parameters a worker needs to run `job_id`
    pub async fn get_import_data(&self, job_id: i64) -> Result<ImportData> {
        let url = format!("{}/rpc/getImportDataForJobID", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ImportDataRequest { job_id })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Report that the worker for `job_id` is alive
    ///
    /// Fails with a `NoSuchCodeImportJob` fault once the job has been
    /// finished or reclaimed.
    pub async fn update_heartbeat(&self, job_id: i64, log_tail: &str) -> Result<()> {
        let url = format!("{}/rpc/updateHeartbeat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&HeartbeatRequest {
                job_id,
                log_tail: log_tail.to_string(),
            })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Finish `job_id` with `status`
    ///
    /// # Arguments
    /// * `log_file_alias_url` - URL returned by `upload_log_file`, if the log
    ///   was uploaded
    pub async fn finish_job(
        &self,
        job_id: i64,
        status: ResultStatus,
        log_file_alias_url: Option<String>,
    ) -> Result<()> {
        let url = format!("{}/rpc/finishJobID", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&FinishJobRequest {
                job_id,
                status_name: status.as_str().to_string(),
                log_file_alias_url,
            })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}
