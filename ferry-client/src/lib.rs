//! Ferry HTTP Client
//!
//! A type-safe HTTP client for the Ferry scheduler API.
//!
//! Dispatchers and workers use the RPC calls (`get_job_for_machine`,
//! `get_import_data`, `update_heartbeat`, `finish_job`) and the librarian
//! upload; the CLI uses the operator endpoints.
//!
//! # Example
//!
//! ```no_run
//! use ferry_client::SchedulerClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SchedulerClient::new("http://localhost:8080");
//!
//!     let job_id = client.get_job_for_machine("bender", 1).await?;
//!     if job_id != 0 {
//!         let data = client.get_import_data(job_id).await?;
//!         println!("Job {} imports into {}", job_id, data.target_url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod imports;
mod librarian;
mod machines;
mod rpc;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use ferry_core::dto::rpc::ImportData;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Ferry scheduler API
///
/// Methods are grouped by caller:
/// - Worker RPC (claim, import data, heartbeat, finish)
/// - Librarian log upload and download
/// - Machine registry
/// - Imports, jobs and the event log
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    /// Base URL of the scheduler (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl SchedulerClient {
    /// Create a new scheduler client
    ///
    /// # Example
    /// ```
    /// use ferry_client::SchedulerClient;
    ///
    /// let client = SchedulerClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new scheduler client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the scheduler
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize a JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Check the status code of a response that carries no body
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::debug!("Scheduler answered {}: {}", status, error_text);
        Err(ClientError::from_response(status.as_u16(), &error_text))
    }
}
