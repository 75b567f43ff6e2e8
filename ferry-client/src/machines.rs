//! Machine registry endpoints

use crate::SchedulerClient;
use crate::error::Result;
use ferry_core::domain::machine::{Machine, MachineState, OfflineReason};
use ferry_core::dto::machine::{MachineStatus, RegisterMachine, SetMachineState};

impl SchedulerClient {
    // =============================================================================
    // Machine Registration & Lifecycle
    // =============================================================================

    /// Register a machine; it starts OFFLINE
    pub async fn register_machine(&self, req: RegisterMachine) -> Result<Machine> {
        let url = format!("{}/machine/register", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Move a machine to another lifecycle state
    ///
    /// # Arguments
    /// * `reason` - Recorded when going OFFLINE
    pub async fn set_machine_state(
        &self,
        hostname: &str,
        state: MachineState,
        reason: Option<OfflineReason>,
    ) -> Result<Machine> {
        let url = format!("{}/machine/{}/state", self.base_url, hostname);
        let response = self
            .client
            .post(&url)
            .json(&SetMachineState { state, reason })
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Machine Query
    // =============================================================================

    /// List all registered machines
    pub async fn list_machines(&self) -> Result<Vec<Machine>> {
        let url = format!("{}/machine/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// A machine's state together with its number of RUNNING jobs
    pub async fn get_machine_status(&self, hostname: &str) -> Result<MachineStatus> {
        let url = format!("{}/machine/{}", self.base_url, hostname);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
