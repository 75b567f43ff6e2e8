//! Librarian endpoints

use crate::SchedulerClient;
use crate::error::Result;
use ferry_core::dto::librarian::{LogFileAlias, UploadLogFile};

impl SchedulerClient {
    /// Upload a finished job's log
    ///
    /// # Returns
    /// The alias whose `url` is passed on to `finish_job`
    pub async fn upload_log_file(&self, filename: &str, content: String) -> Result<LogFileAlias> {
        let url = format!("{}/librarian/upload", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&UploadLogFile {
                filename: filename.to_string(),
                content,
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Download a stored log by its alias URL
    pub async fn download_log_file(&self, alias_url: &str) -> Result<String> {
        let response = self.client.get(alias_url).send().await?;
        let response = Self::check_status(response).await?;

        Ok(response.text().await?)
    }
}
