//! Dispatcher
//!
//! One pass of the per-machine dispatch loop, normally run from cron: check
//! this machine's state, ask the scheduler for a job, and launch a worker
//! for it.

pub mod launcher;

pub use launcher::{ProcessLauncher, WorkerLauncher};

use anyhow::{Context, Result};
use ferry_core::domain::machine::MachineState;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::repository::MachineRepository;

/// What a dispatch pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The machine is OFFLINE; nothing was asked for
    Offline,
    /// The machine was quiescing with nothing running and is now OFFLINE
    WentOffline,
    /// The machine is quiescing and still has jobs running
    Quiescing { running: u32 },
    /// The machine already runs as many jobs as it may
    AtCapacity { running: u32 },
    /// The scheduler had nothing due
    NoJobs,
    /// A worker was started for this job
    Launched(i64),
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Offline => write!(f, "machine is offline"),
            DispatchOutcome::WentOffline => write!(f, "finished quiescing, now offline"),
            DispatchOutcome::Quiescing { running } => {
                write!(f, "quiescing with {} job(s) still running", running)
            }
            DispatchOutcome::AtCapacity { running } => {
                write!(f, "at capacity with {} job(s) running", running)
            }
            DispatchOutcome::NoJobs => write!(f, "no jobs pending"),
            DispatchOutcome::Launched(job_id) => write!(f, "started worker for job {}", job_id),
        }
    }
}

pub struct Dispatcher {
    hostname: String,
    worker_limit: u32,
    machines: Arc<dyn MachineRepository>,
    launcher: Arc<dyn WorkerLauncher>,
}

impl Dispatcher {
    pub fn new(
        hostname: String,
        worker_limit: u32,
        machines: Arc<dyn MachineRepository>,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Self {
        Self {
            hostname,
            worker_limit,
            machines,
            launcher,
        }
    }

    /// Runs one dispatch pass
    ///
    /// The machine's registered ceiling caps `worker_limit`. Errors reading
    /// machine state, claiming, or launching are returned;
    /// a job claimed but never started is later reclaimed by the scheduler.
    pub async fn dispatch_once(&self) -> Result<DispatchOutcome> {
        let status = self
            .machines
            .machine_status(&self.hostname)
            .await
            .context("Failed to read machine state")?;

        let (running, ceiling, heartbeat_interval) = match status {
            Some(status) => {
                match status.machine.state {
                    MachineState::Offline => {
                        info!("Machine {} is OFFLINE, not dispatching", self.hostname);
                        return Ok(DispatchOutcome::Offline);
                    }
                    MachineState::Quiescing if status.running_jobs == 0 => {
                        self.machines
                            .finish_quiescing(&self.hostname)
                            .await
                            .context("Failed to take quiesced machine offline")?;
                        info!("Machine {} finished quiescing, now OFFLINE", self.hostname);
                        return Ok(DispatchOutcome::WentOffline);
                    }
                    MachineState::Quiescing => {
                        info!(
                            "Machine {} is quiescing, waiting for {} job(s)",
                            self.hostname, status.running_jobs
                        );
                        return Ok(DispatchOutcome::Quiescing {
                            running: status.running_jobs,
                        });
                    }
                    MachineState::Online => {}
                }
                (
                    status.running_jobs,
                    status.machine.job_ceiling(self.worker_limit),
                    Some(Duration::from_secs(status.machine.heartbeat_interval.into())),
                )
            }
            None => {
                debug!(
                    "Machine {} is not registered yet; the claim will register it",
                    self.hostname
                );
                (0, self.worker_limit, None)
            }
        };

        if running >= ceiling {
            info!(
                "Machine {} already runs {} of {} job(s)",
                self.hostname, running, ceiling
            );
            return Ok(DispatchOutcome::AtCapacity { running });
        }

        let job_id = self
            .machines
            .get_job_for_machine(&self.hostname, ceiling)
            .await
            .context("Failed to ask for a job")?;

        if job_id == 0 {
            info!("No jobs pending");
            return Ok(DispatchOutcome::NoJobs);
        }

        self.launcher
            .launch(job_id, heartbeat_interval)
            .with_context(|| format!("Failed to start worker for job {}", job_id))?;

        Ok(DispatchOutcome::Launched(job_id))
    }
}
