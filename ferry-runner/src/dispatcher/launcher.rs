//! Worker launcher
//!
//! Starts a detached `ferry-worker` process for a claimed job. Launching
//! succeeds once the process exists; the dispatcher never waits on it.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::config::Config;
use crate::service::AccessPolicyKind;

pub trait WorkerLauncher: Send + Sync {
    /// Starts a worker for `job_id`; `heartbeat_interval` is the machine's
    /// registered cadence, when the scheduler knows it
    fn launch(&self, job_id: i64, heartbeat_interval: Option<Duration>) -> Result<()>;
}

/// Launches workers as OS processes
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: PathBuf,
    log_directory: PathBuf,
    scheduler_url: String,
    verbosity: u8,
    access_policy: Option<AccessPolicyKind>,
}

impl ProcessLauncher {
    pub fn new(config: &Config, verbosity: u8, access_policy: Option<AccessPolicyKind>) -> Self {
        Self {
            binary: config.worker_binary.clone(),
            log_directory: config.log_directory.clone(),
            scheduler_url: config.scheduler_url.clone(),
            verbosity,
            access_policy,
        }
    }

    pub fn log_file(&self, job_id: i64) -> PathBuf {
        self.log_directory.join(format!("job-{}.log", job_id))
    }

    /// `<job_id> [-v|-vv] --log-file <path> [--access-policy <policy>]`
    pub fn command_args(&self, job_id: i64) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![job_id.to_string().into()];

        match self.verbosity {
            0 => {}
            1 => args.push("-v".into()),
            _ => args.push("-vv".into()),
        }

        args.push("--log-file".into());
        args.push(self.log_file(job_id).into());

        if let Some(policy) = self.access_policy {
            args.push("--access-policy".into());
            args.push(policy.as_str().into());
        }

        args
    }

    /// Environment handed to the worker on top of the dispatcher's own
    pub fn worker_env(&self, heartbeat_interval: Option<Duration>) -> Vec<(&'static str, String)> {
        let mut env = vec![("SCHEDULER_URL", self.scheduler_url.clone())];
        if let Some(interval) = heartbeat_interval {
            env.push(("HEARTBEAT_INTERVAL", interval.as_secs().max(1).to_string()));
        }
        env
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, job_id: i64, heartbeat_interval: Option<Duration>) -> Result<()> {
        std::fs::create_dir_all(&self.log_directory).with_context(|| {
            format!(
                "Failed to create log directory {}",
                self.log_directory.display()
            )
        })?;

        let mut command = Command::new(&self.binary);
        command
            .args(self.command_args(job_id))
            .envs(self.worker_env(heartbeat_interval))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group, so the worker outlives a dispatcher killed by
        // its terminal
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .with_context(|| format!("Failed to start {}", self.binary.display()))?;

        tracing::info!(
            "Started worker (pid {}) for job {}, logging to {}",
            child.id(),
            job_id,
            self.log_file(job_id).display()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher(binary: &str, verbosity: u8, policy: Option<AccessPolicyKind>) -> ProcessLauncher {
        let config = Config {
            worker_binary: PathBuf::from(binary),
            log_directory: std::env::temp_dir().join(format!("ferry-test-{}", uuid::Uuid::new_v4())),
            ..Config::default()
        };
        ProcessLauncher::new(&config, verbosity, policy)
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_command_args() {
        let launcher = launcher("ferry-worker", 0, None);
        let args = strings(launcher.command_args(42));
        assert_eq!(args[0], "42");
        assert_eq!(args[1], "--log-file");
        assert!(args[2].ends_with("job-42.log"));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_verbosity_and_policy_are_forwarded() {
        let launcher = launcher("ferry-worker", 2, Some(AccessPolicyKind::Anything));
        let args = strings(launcher.command_args(7));
        assert_eq!(args[1], "-vv");
        assert_eq!(&args[args.len() - 2..], ["--access-policy", "anything"]);
    }

    #[test]
    fn test_machine_heartbeat_interval_reaches_the_worker() {
        let launcher = launcher("ferry-worker", 0, None);

        let env = launcher.worker_env(Some(Duration::from_secs(15)));
        assert_eq!(env[0], ("SCHEDULER_URL", "http://localhost:8080".to_string()));
        assert_eq!(env[1], ("HEARTBEAT_INTERVAL", "15".to_string()));

        assert_eq!(launcher.worker_env(None).len(), 1);
    }

    #[test]
    fn test_missing_binary_fails_to_launch() {
        let launcher = launcher("/nonexistent/ferry-worker", 0, None);
        assert!(launcher.launch(1, None).is_err());
    }

    #[test]
    fn test_launch_does_not_wait() {
        let launcher = launcher("true", 1, None);
        assert!(launcher.launch(3, Some(Duration::from_secs(15))).is_ok());
    }
}
