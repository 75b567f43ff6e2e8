//! Machine domain model
//!
//! A machine is a worker host that runs import jobs. Its lifecycle state
//! decides whether the scheduler will hand it new work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default number of seconds between worker heartbeats on a machine
pub const DEFAULT_HEARTBEAT_INTERVAL: u32 = 30;

/// Default number of jobs a machine may run at once
pub const DEFAULT_MAX_CONCURRENT_JOBS: u32 = 1;

/// A worker host known to the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// Hostname, unique across the registry
    pub hostname: String,

    /// Current lifecycle state
    pub state: MachineState,

    /// Why the machine last went offline, if it is offline
    pub offline_reason: Option<OfflineReason>,

    /// Seconds between heartbeats expected from this machine's workers
    pub heartbeat_interval: u32,

    /// Concurrency ceiling for jobs on this machine
    pub max_concurrent_jobs: u32,

    /// When this machine was first registered
    pub registered_at: DateTime<Utc>,
}

impl Machine {
    /// Jobs this machine may run at once when its dispatcher offers
    /// `worker_limit`: the smaller of the two
    pub fn job_ceiling(&self, worker_limit: u32) -> u32 {
        worker_limit.min(self.max_concurrent_jobs)
    }

    /// Admission rule against the registry's ceiling for this machine
    pub fn admission(&self, running_jobs: u32, worker_limit: u32) -> Admission {
        self.state
            .admission(running_jobs, self.job_ceiling(worker_limit))
    }
}

/// Lifecycle state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    /// Accepts no jobs
    Offline,

    /// Accepts jobs up to its concurrency ceiling
    Online,

    /// Accepts no new jobs; goes offline once running jobs finish
    Quiescing,
}

/// Reason recorded when a machine transitions to OFFLINE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfflineReason {
    /// Stopped by an operator
    Stopped,

    /// Drained: the last running job finished while quiescing
    Quiesced,

    /// Taken offline by an external watchdog
    Watchdog,
}

/// What the scheduler should do when a machine asks for work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Look for a job to hand out
    Accept,

    /// Hand out nothing
    Refuse,

    /// Hand out nothing and take the drained machine offline
    GoOffline,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Offline => "OFFLINE",
            MachineState::Online => "ONLINE",
            MachineState::Quiescing => "QUIESCING",
        }
    }

    /// Admission rule applied when a machine asks for a job
    ///
    /// `running_jobs` is the number of jobs currently RUNNING on the machine.
    pub fn admission(self, running_jobs: u32, worker_limit: u32) -> Admission {
        match self {
            MachineState::Offline => Admission::Refuse,
            MachineState::Quiescing if running_jobs == 0 => Admission::GoOffline,
            MachineState::Quiescing => Admission::Refuse,
            MachineState::Online if running_jobs < worker_limit => Admission::Accept,
            MachineState::Online => Admission::Refuse,
        }
    }

    /// Whether an operator may move a machine from `self` to `next`
    ///
    /// QUIESCING → OFFLINE is also legal here: it is how a drained machine is
    /// taken offline once it has nothing left to run.
    pub fn can_transition_to(self, next: MachineState) -> bool {
        matches!(
            (self, next),
            (MachineState::Offline, MachineState::Online)
                | (MachineState::Online, MachineState::Quiescing)
                | (MachineState::Online, MachineState::Offline)
                | (MachineState::Quiescing, MachineState::Online)
                | (MachineState::Quiescing, MachineState::Offline)
        )
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFFLINE" => Ok(MachineState::Offline),
            "ONLINE" => Ok(MachineState::Online),
            "QUIESCING" => Ok(MachineState::Quiescing),
            _ => Err(format!("unknown machine state: {}", s)),
        }
    }
}

impl OfflineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfflineReason::Stopped => "STOPPED",
            OfflineReason::Quiesced => "QUIESCED",
            OfflineReason::Watchdog => "WATCHDOG",
        }
    }
}

impl std::fmt::Display for OfflineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfflineReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOPPED" => Ok(OfflineReason::Stopped),
            "QUIESCED" => Ok(OfflineReason::Quiesced),
            "WATCHDOG" => Ok(OfflineReason::Watchdog),
            _ => Err(format!("unknown offline reason: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_machine_is_refused() {
        assert_eq!(MachineState::Offline.admission(0, 4), Admission::Refuse);
    }

    #[test]
    fn test_quiescing_machine_goes_offline_only_when_idle() {
        assert_eq!(MachineState::Quiescing.admission(0, 4), Admission::GoOffline);
        assert_eq!(MachineState::Quiescing.admission(1, 4), Admission::Refuse);
    }

    #[test]
    fn test_online_machine_respects_worker_limit() {
        assert_eq!(MachineState::Online.admission(0, 1), Admission::Accept);
        assert_eq!(MachineState::Online.admission(1, 1), Admission::Refuse);
        assert_eq!(MachineState::Online.admission(2, 1), Admission::Refuse);
        assert_eq!(MachineState::Online.admission(0, 0), Admission::Refuse);
    }

    #[test]
    fn test_registry_ceiling_caps_the_worker_limit() {
        let machine = Machine {
            hostname: "bender".to_string(),
            state: MachineState::Online,
            offline_reason: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_concurrent_jobs: 1,
            registered_at: Utc::now(),
        };
        assert_eq!(machine.job_ceiling(4), 1);
        assert_eq!(machine.admission(0, 4), Admission::Accept);
        assert_eq!(machine.admission(1, 4), Admission::Refuse);

        let roomy = Machine {
            max_concurrent_jobs: 8,
            ..machine
        };
        assert_eq!(roomy.job_ceiling(2), 2);
        assert_eq!(roomy.admission(2, 2), Admission::Refuse);
    }

    #[test]
    fn test_transitions() {
        use MachineState::*;
        assert!(Offline.can_transition_to(Online));
        assert!(Online.can_transition_to(Quiescing));
        assert!(Quiescing.can_transition_to(Offline));
        assert!(!Offline.can_transition_to(Quiescing));
        assert!(!Online.can_transition_to(Online));
    }

    #[test]
    fn test_state_round_trips_through_strings() {
        for state in [
            MachineState::Offline,
            MachineState::Online,
            MachineState::Quiescing,
        ] {
            assert_eq!(state.as_str().parse::<MachineState>(), Ok(state));
        }
        assert!("BUSY".parse::<MachineState>().is_err());
    }
}
