//! Import, job and event endpoints

use crate::SchedulerClient;
use crate::error::Result;
use ferry_core::domain::code_import::CodeImport;
use ferry_core::domain::event::ImportEvent;
use ferry_core::domain::job::Job;
use ferry_core::domain::result::ImportResult;
use ferry_core::dto::import::{CreateCodeImport, RequestImport};

impl SchedulerClient {
    // =============================================================================
    // Import Management
    // =============================================================================

    /// Create an import; its first job is due immediately
    pub async fn create_import(&self, req: CreateCodeImport) -> Result<CodeImport> {
        let url = format!("{}/import/create", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    pub async fn list_imports(&self) -> Result<Vec<CodeImport>> {
        let url = format!("{}/import/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_import(&self, id: i64) -> Result<CodeImport> {
        let url = format!("{}/import/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Ask for an import to run as soon as a machine is free
    pub async fn request_import(&self, id: i64, requested_by: &str) -> Result<Job> {
        let url = format!("{}/import/{}/request", self.base_url, id);
        let response = self
            .client
            .post(&url)
            .json(&RequestImport {
                requested_by: requested_by.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Results of an import, newest first
    pub async fn list_results(&self, id: i64) -> Result<Vec<ImportResult>> {
        let url = format!("{}/import/{}/results", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Jobs & Events
    // =============================================================================

    /// All queued and running jobs
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let url = format!("{}/job/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_job(&self, id: i64) -> Result<Job> {
        let url = format!("{}/job/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// The most recent `limit` events, newest first
    pub async fn list_events(&self, limit: i64) -> Result<Vec<ImportEvent>> {
        let url = format!("{}/event/list", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;

        self.handle_response(response).await
    }
}
