//! Runner configuration
//!
//! Settings shared by the dispatcher and the worker: where the scheduler
//! lives, who this machine is, and how jobs are run and logged.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheduler base URL (e.g., "http://localhost:8080")
    pub scheduler_url: String,

    /// Explicit machine identity; the system hostname when unset
    pub hostname: Option<String>,

    /// Concurrency ceiling for this machine
    pub worker_limit: u32,

    /// Program the dispatcher starts for each claimed job
    pub worker_binary: PathBuf,

    /// Where worker log files are written
    pub log_directory: PathBuf,

    /// How often a worker heartbeats while its import runs
    pub heartbeat_interval: Duration,

    /// Wall-clock limit for one import, if any
    pub job_timeout: Option<Duration>,

    /// Parent of the per-job scratch directories
    pub working_directory_root: PathBuf,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SCHEDULER_URL (default: http://localhost:8080)
    /// - FERRY_HOSTNAME (optional)
    /// - WORKER_LIMIT (default: 1)
    /// - WORKER_BINARY (default: ferry-worker)
    /// - LOG_DIRECTORY (default: /var/tmp/ferry/logs)
    /// - HEARTBEAT_INTERVAL (seconds, default: 30)
    /// - JOB_TIMEOUT (seconds, default: 0 = no limit)
    /// - WORKING_DIRECTORY_ROOT (default: /var/tmp/ferry/work)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from any key/value source, falling back to
    /// defaults for missing or unparseable values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let secs = |key: &str| lookup(key).and_then(|s| s.parse::<u64>().ok());

        Self {
            scheduler_url: lookup("SCHEDULER_URL").unwrap_or(defaults.scheduler_url),
            hostname: lookup("FERRY_HOSTNAME").filter(|h| !h.trim().is_empty()),
            worker_limit: lookup("WORKER_LIMIT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.worker_limit),
            worker_binary: lookup("WORKER_BINARY")
                .map(PathBuf::from)
                .unwrap_or(defaults.worker_binary),
            log_directory: lookup("LOG_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_directory),
            heartbeat_interval: secs("HEARTBEAT_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            job_timeout: match secs("JOB_TIMEOUT") {
                Some(0) => None,
                Some(s) => Some(Duration::from_secs(s)),
                None => defaults.job_timeout,
            },
            working_directory_root: lookup("WORKING_DIRECTORY_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.working_directory_root),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler_url.is_empty() {
            anyhow::bail!("scheduler_url cannot be empty");
        }

        if !self.scheduler_url.starts_with("http://") && !self.scheduler_url.starts_with("https://")
        {
            anyhow::bail!("scheduler_url must start with http:// or https://");
        }

        if self.worker_limit == 0 {
            anyhow::bail!("worker_limit must be greater than 0");
        }

        if self.heartbeat_interval.is_zero() {
            anyhow::bail!("heartbeat_interval must be greater than 0");
        }

        if self.worker_binary.as_os_str().is_empty() {
            anyhow::bail!("worker_binary cannot be empty");
        }

        Ok(())
    }

    /// The identity this machine uses with the scheduler
    ///
    /// An explicit hostname wins; otherwise `HOSTNAME`, then the kernel's
    /// hostname.
    pub fn resolve_hostname(&self) -> anyhow::Result<String> {
        if let Some(hostname) = &self.hostname {
            return Ok(hostname.clone());
        }

        if let Ok(hostname) = std::env::var("HOSTNAME")
            && !hostname.trim().is_empty()
        {
            return Ok(hostname.trim().to_string());
        }

        let hostname = std::fs::read_to_string("/proc/sys/kernel/hostname")
            .map_err(|e| anyhow::anyhow!("Failed to determine hostname: {}", e))?;
        let hostname = hostname.trim();
        if hostname.is_empty() {
            anyhow::bail!("System hostname is empty; set FERRY_HOSTNAME");
        }
        Ok(hostname.to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler_url: "http://localhost:8080".to_string(),
            hostname: None,
            worker_limit: 1,
            worker_binary: PathBuf::from("ferry-worker"),
            log_directory: PathBuf::from("/var/tmp/ferry/logs"),
            heartbeat_interval: Duration::from_secs(30),
            job_timeout: None,
            working_directory_root: PathBuf::from("/var/tmp/ferry/work"),
        }
    }
}
