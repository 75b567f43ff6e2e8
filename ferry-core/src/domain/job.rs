//! Import job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Upper bound on the stored log tail, in bytes
pub const MAX_LOG_TAIL_BYTES: usize = 4000;

/// A queued or running import attempt
///
/// At most one job exists per code import. Finishing a job deletes it; the
/// attempt lives on as an `ImportResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub code_import_id: i64,
    pub state: JobState,
    /// Machine running the job, set only while RUNNING
    pub machine: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_due: DateTime<Utc>,
    pub date_started: Option<DateTime<Utc>>,
    pub heartbeat: Option<DateTime<Utc>>,
    pub logtail: String,
    /// Operator who asked for this run, if any
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
}

impl Job {
    /// Whether a machine may claim this job at `now`
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.machine.is_none() && self.date_due <= now
    }

    /// Whether the job's last heartbeat is older than `cutoff`
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.state == JobState::Running && self.heartbeat.is_some_and(|beat| beat < cutoff)
    }
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
        }
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            _ => Err(format!("unknown job state: {}", s)),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keeps the last `MAX_LOG_TAIL_BYTES` bytes of `tail`
///
/// The cut is moved forward to the next character boundary so the result is
/// always valid UTF-8.
pub fn truncate_log_tail(tail: &str) -> &str {
    if tail.len() <= MAX_LOG_TAIL_BYTES {
        return tail;
    }
    let mut start = tail.len() - MAX_LOG_TAIL_BYTES;
    while !tail.is_char_boundary(start) {
        start += 1;
    }
    &tail[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_job(due: DateTime<Utc>) -> Job {
        Job {
            id: 1,
            code_import_id: 1,
            state: JobState::Pending,
            machine: None,
            date_created: due,
            date_due: due,
            date_started: None,
            heartbeat: None,
            logtail: String::new(),
            requested_by: None,
        }
    }

    #[test]
    fn test_claimable_only_when_due() {
        let now = Utc::now();
        assert!(pending_job(now).is_claimable(now));
        assert!(!pending_job(now + Duration::seconds(1)).is_claimable(now));

        let mut running = pending_job(now);
        running.state = JobState::Running;
        running.machine = Some("bender".to_string());
        assert!(!running.is_claimable(now));
    }

    #[test]
    fn test_stale_requires_old_heartbeat() {
        let now = Utc::now();
        let mut job = pending_job(now);
        job.state = JobState::Running;
        job.heartbeat = Some(now - Duration::minutes(20));
        assert!(job.is_stale(now - Duration::minutes(10)));
        assert!(!job.is_stale(now - Duration::minutes(30)));
    }

    #[test]
    fn test_short_tail_is_kept() {
        assert_eq!(truncate_log_tail("line 1\nline 2"), "line 1\nline 2");
    }

    #[test]
    fn test_long_tail_keeps_the_end() {
        let tail = format!("{}END", "x".repeat(5000));
        let kept = truncate_log_tail(&tail);
        assert_eq!(kept.len(), MAX_LOG_TAIL_BYTES);
        assert!(kept.ends_with("END"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 'é' is two bytes, so an even cut would land inside a character
        let tail = format!("a{}", "é".repeat(2500));
        let kept = truncate_log_tail(&tail);
        assert!(kept.len() <= MAX_LOG_TAIL_BYTES);
        assert!(kept.chars().all(|c| c == 'é'));
    }
}
