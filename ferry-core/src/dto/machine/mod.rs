//! Machine DTOs
//!
//! Data transfer objects for machine registry operations.

use serde::{Deserialize, Serialize};

use crate::domain::machine::{Machine, MachineState, OfflineReason};

/// Request to register a machine with the scheduler
///
/// Operator-registered machines start OFFLINE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMachine {
    pub hostname: String,

    /// Seconds between worker heartbeats; registry default when omitted
    #[serde(default)]
    pub heartbeat_interval: Option<u32>,

    /// Concurrency ceiling; registry default when omitted
    #[serde(default)]
    pub max_concurrent_jobs: Option<u32>,
}

/// Machine together with its current load, as read by a dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineStatus {
    pub machine: Machine,

    /// Number of RUNNING jobs on the machine
    pub running_jobs: u32,
}

/// Request to move a machine to another lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMachineState {
    pub state: MachineState,

    /// Recorded when going OFFLINE; STOPPED when omitted
    #[serde(default)]
    pub reason: Option<OfflineReason>,
}
