//! Machine Service
//!
//! Business logic for the machine registry: registration and the operator
//! side of the machine lifecycle.

use chrono::Utc;
use ferry_core::domain::machine::{Machine, MachineState};
use ferry_core::dto::machine::{MachineStatus, RegisterMachine, SetMachineState};

use crate::repository::{MachineStore, Store, StoreError, Transition};

/// Service error type
#[derive(Debug)]
pub enum MachineError {
    NotFound(String),
    AlreadyRegistered(String),
    InvalidTransition { from: MachineState, to: MachineState },
    ValidationError(String),
    StoreError(StoreError),
}

impl From<StoreError> for MachineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => MachineError::AlreadyRegistered(msg),
            other => MachineError::StoreError(other),
        }
    }
}

/// Register a new machine; it starts OFFLINE
pub async fn register_machine(
    store: &dyn Store,
    req: RegisterMachine,
) -> Result<Machine, MachineError> {
    validate_registration(&req)?;

    let machine = store.register_machine(&req, Utc::now()).await?;

    tracing::info!("Machine registered: {}", machine.hostname);
    Ok(machine)
}

/// Machine together with the number of jobs running on it
pub async fn get_machine_status(
    store: &dyn Store,
    hostname: &str,
) -> Result<MachineStatus, MachineError> {
    let machine = store
        .find_machine(hostname)
        .await?
        .ok_or_else(|| MachineError::NotFound(hostname.to_string()))?;
    let running_jobs = store.running_job_count(hostname).await?;

    Ok(MachineStatus {
        machine,
        running_jobs,
    })
}

/// List all machines
pub async fn list_machines(store: &dyn Store) -> Result<Vec<Machine>, MachineError> {
    Ok(store.list_machines().await?)
}

/// Move a machine to another lifecycle state
pub async fn set_machine_state(
    store: &dyn Store,
    hostname: &str,
    req: SetMachineState,
) -> Result<Machine, MachineError> {
    let transition = store
        .transition_machine(hostname, req.state, req.reason, Utc::now())
        .await?
        .ok_or_else(|| MachineError::NotFound(hostname.to_string()))?;

    match transition {
        Transition::Applied(machine) => {
            tracing::info!("Machine {} is now {}", hostname, machine.state);
            Ok(machine)
        }
        Transition::Rejected { current } => Err(MachineError::InvalidTransition {
            from: current,
            to: req.state,
        }),
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_registration(req: &RegisterMachine) -> Result<(), MachineError> {
    if req.hostname.trim().is_empty() {
        return Err(MachineError::ValidationError(
            "hostname cannot be empty".to_string(),
        ));
    }

    if req.max_concurrent_jobs == Some(0) {
        return Err(MachineError::ValidationError(
            "max_concurrent_jobs must be greater than 0".to_string(),
        ));
    }

    if req.heartbeat_interval == Some(0) {
        return Err(MachineError::ValidationError(
            "heartbeat_interval must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(hostname: &str) -> RegisterMachine {
        RegisterMachine {
            hostname: hostname.to_string(),
            heartbeat_interval: None,
            max_concurrent_jobs: None,
        }
    }

    #[test]
    fn test_validate_registration_valid() {
        assert!(validate_registration(&registration("bender")).is_ok());
    }

    #[test]
    fn test_validate_registration_invalid() {
        assert!(validate_registration(&registration("  ")).is_err());

        let mut req = registration("bender");
        req.max_concurrent_jobs = Some(0);
        assert!(validate_registration(&req).is_err());
    }
}
