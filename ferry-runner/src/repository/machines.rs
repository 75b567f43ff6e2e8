//! Machine repository
//!
//! What the dispatcher needs from the scheduler: its own machine state, the
//! quiesced transition, and a job claim.

use async_trait::async_trait;
use ferry_client::{ClientError, SchedulerClient};
use ferry_core::domain::machine::{MachineState, OfflineReason};
use ferry_core::dto::machine::MachineStatus;

#[async_trait]
pub trait MachineRepository: Send + Sync {
    /// The machine and its running-job count, or `None` if the scheduler
    /// has never heard of it
    async fn machine_status(&self, hostname: &str) -> Result<Option<MachineStatus>, ClientError>;

    /// Moves a quiescing machine with nothing running to OFFLINE
    async fn finish_quiescing(&self, hostname: &str) -> Result<(), ClientError>;

    /// Claims the next due job; 0 when none was handed out
    async fn get_job_for_machine(
        &self,
        hostname: &str,
        worker_limit: u32,
    ) -> Result<i64, ClientError>;
}

#[async_trait]
impl MachineRepository for SchedulerClient {
    async fn machine_status(&self, hostname: &str) -> Result<Option<MachineStatus>, ClientError> {
        match self.get_machine_status(hostname).await {
            Ok(status) => Ok(Some(status)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn finish_quiescing(&self, hostname: &str) -> Result<(), ClientError> {
        self.set_machine_state(hostname, MachineState::Offline, Some(OfflineReason::Quiesced))
            .await
            .map(|_| ())
    }

    async fn get_job_for_machine(
        &self,
        hostname: &str,
        worker_limit: u32,
    ) -> Result<i64, ClientError> {
        SchedulerClient::get_job_for_machine(self, hostname, worker_limit).await
    }
}
