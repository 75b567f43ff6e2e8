//! Code import domain types
//!
//! A code import is the standing definition "mirror remote repository X into
//! our hosted copy Y". Each run of it is a job; each finished run a result.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::result::ResultStatus;
use crate::domain::source::{RcsType, SourceDetails, SourceLocation, TargetRcsType};

/// Longest interval an import may be configured with, in seconds (one year)
pub const MAX_UPDATE_INTERVAL_SECS: i64 = 365 * 24 * 60 * 60;

/// Longest delay a failure backoff may push the next run out by
pub fn max_retry_delay() -> Duration {
    Duration::seconds(MAX_UPDATE_INTERVAL_SECS)
}

/// Import definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeImport {
    pub id: i64,
    /// Unique name of the hosted branch or repository
    pub target_name: String,
    pub rcs_type: RcsType,
    pub target_rcs_type: TargetRcsType,
    pub url: Option<String>,
    pub cvs_root: Option<String>,
    pub cvs_module: Option<String>,
    pub review_status: ReviewStatus,
    /// Seconds between runs; the per-rcs default applies when unset
    pub update_interval: Option<i64>,
    pub date_created: DateTime<Utc>,
    pub date_last_successful: Option<DateTime<Utc>>,
}

/// Whether an import is being scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    /// Scheduled normally
    Reviewed,

    /// Switched off by an operator
    Suspended,

    /// Switched off after too many consecutive failures
    Failing,
}

/// When the next job for an import should run, decided after a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    /// Queue a new job due at the given time
    At(DateTime<Utc>),

    /// Queue nothing; the import stays idle
    Idle,

    /// Queue nothing and mark the import as failing
    MarkFailing,
}

impl CodeImport {
    /// Interval between runs, falling back to the per-rcs default
    ///
    /// Stored values are clamped to `1..=MAX_UPDATE_INTERVAL_SECS` seconds.
    pub fn effective_update_interval(&self) -> Duration {
        match self.update_interval {
            Some(seconds) => Duration::seconds(seconds.clamp(1, MAX_UPDATE_INTERVAL_SECS)),
            None => default_update_interval(self.rcs_type),
        }
    }

    /// Source details handed to the worker
    ///
    /// The target is identified by its unique name.
    pub fn source_details(&self) -> SourceDetails {
        let location = match self.rcs_type {
            RcsType::Cvs => SourceLocation::Cvs {
                root: self.cvs_root.clone().unwrap_or_default(),
                module: self.cvs_module.clone().unwrap_or_default(),
            },
            _ => SourceLocation::Url(self.url.clone().unwrap_or_default()),
        };

        SourceDetails {
            target_id: self.target_name.clone(),
            rcs_type: self.rcs_type,
            target_rcs_type: self.target_rcs_type,
            location,
        }
    }

    /// Worker arguments for this import
    pub fn worker_arguments(&self) -> Vec<String> {
        self.source_details().to_arguments()
    }

    /// Name the worker log is uploaded under
    pub fn log_file_name(&self) -> String {
        format!(
            "{}.log",
            self.target_name.trim_start_matches('~').replace('/', "-")
        )
    }

    /// Decides when the next job runs after a job finished with `status`
    ///
    /// `failure_count` is the number of results since the last success,
    /// including the one just recorded. Reclaimed jobs are re-queued straight
    /// away without counting towards the failure limit.
    pub fn next_run(
        &self,
        status: ResultStatus,
        failure_count: u32,
        failure_limit: u32,
        date_started: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> NextRun {
        if self.review_status != ReviewStatus::Reviewed {
            return NextRun::Idle;
        }

        if status == ResultStatus::Reclaimed {
            return NextRun::At(now);
        }

        if failure_count >= failure_limit {
            return NextRun::MarkFailing;
        }

        let interval = if status == ResultStatus::SuccessPartial {
            Duration::zero()
        } else if failure_count > 0 {
            let factor = 2i32.saturating_pow(failure_count - 1);
            self.effective_update_interval()
                .checked_mul(factor)
                .unwrap_or_else(max_retry_delay)
                .min(max_retry_delay())
        } else {
            self.effective_update_interval()
        };

        let due = date_started
            .checked_add_signed(interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        NextRun::At(due.max(now))
    }
}

/// Default interval between runs for each kind of import
pub fn default_update_interval(rcs_type: RcsType) -> Duration {
    match rcs_type {
        RcsType::Cvs => Duration::hours(12),
        RcsType::Bzr | RcsType::BzrSvn | RcsType::Git => Duration::hours(6),
    }
}

/// Checks that a source/target pairing and its location fields make sense
pub fn validate_definition(
    rcs_type: RcsType,
    target_rcs_type: TargetRcsType,
    url: Option<&str>,
    cvs_root: Option<&str>,
    cvs_module: Option<&str>,
) -> Result<(), String> {
    if target_rcs_type == TargetRcsType::Git && rcs_type != RcsType::Git {
        return Err(format!(
            "{} imports cannot target a git repository",
            rcs_type.arg_name()
        ));
    }

    let present = |value: Option<&str>| value.is_some_and(|v| !v.trim().is_empty());

    if rcs_type.uses_url() {
        if !present(url) {
            return Err(format!("{} imports require a url", rcs_type.arg_name()));
        }
    } else if !present(cvs_root) || !present(cvs_module) {
        return Err("cvs imports require a cvs root and module".to_string());
    }

    Ok(())
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Reviewed => "REVIEWED",
            ReviewStatus::Suspended => "SUSPENDED",
            ReviewStatus::Failing => "FAILING",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REVIEWED" => Ok(ReviewStatus::Reviewed),
            "SUSPENDED" => Ok(ReviewStatus::Suspended),
            "FAILING" => Ok(ReviewStatus::Failing),
            _ => Err(format!("unknown review status: {}", s)),
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_import() -> CodeImport {
        CodeImport {
            id: 1,
            target_name: "~alice/widget/+git/widget".to_string(),
            rcs_type: RcsType::Git,
            target_rcs_type: TargetRcsType::Git,
            url: Some("https://git.example.com/widget.git".to_string()),
            cvs_root: None,
            cvs_module: None,
            review_status: ReviewStatus::Reviewed,
            update_interval: Some(3600),
            date_created: Utc::now(),
            date_last_successful: None,
        }
    }

    #[test]
    fn test_worker_arguments() {
        assert_eq!(
            git_import().worker_arguments(),
            vec![
                "~alice/widget/+git/widget".to_string(),
                "git:git".to_string(),
                "https://git.example.com/widget.git".to_string(),
            ]
        );
    }

    #[test]
    fn test_log_file_name() {
        assert_eq!(git_import().log_file_name(), "alice-widget-+git-widget.log");
    }

    #[test]
    fn test_next_run_after_success_waits_one_interval() {
        let import = git_import();
        let started = Utc::now();
        let next = import.next_run(ResultStatus::Success, 0, 5, started, started);
        assert_eq!(next, NextRun::At(started + Duration::hours(1)));
    }

    #[test]
    fn test_next_run_backs_off_exponentially() {
        let import = git_import();
        let started = Utc::now();
        let next = import.next_run(ResultStatus::Failure, 3, 5, started, started);
        assert_eq!(next, NextRun::At(started + Duration::hours(4)));
    }

    #[test]
    fn test_huge_interval_is_clamped() {
        let mut import = git_import();
        import.update_interval = Some(10_000_000_000_000);
        let started = Utc::now();
        assert_eq!(
            import.effective_update_interval(),
            Duration::seconds(MAX_UPDATE_INTERVAL_SECS)
        );
        assert_eq!(
            import.next_run(ResultStatus::Success, 0, 5, started, started),
            NextRun::At(started + Duration::seconds(MAX_UPDATE_INTERVAL_SECS))
        );
    }

    #[test]
    fn test_long_failure_streak_caps_the_backoff() {
        let mut import = git_import();
        import.update_interval = Some(MAX_UPDATE_INTERVAL_SECS);
        let started = Utc::now();
        assert_eq!(
            import.next_run(ResultStatus::Failure, 60, 1000, started, started),
            NextRun::At(started + max_retry_delay())
        );
    }

    #[test]
    fn test_next_run_marks_failing_at_limit() {
        let import = git_import();
        let now = Utc::now();
        assert_eq!(
            import.next_run(ResultStatus::Failure, 5, 5, now, now),
            NextRun::MarkFailing
        );
    }

    #[test]
    fn test_partial_success_and_reclaim_run_immediately() {
        let import = git_import();
        let now = Utc::now();
        let started = now - Duration::minutes(10);
        assert_eq!(
            import.next_run(ResultStatus::SuccessPartial, 0, 5, started, now),
            NextRun::At(now)
        );
        assert_eq!(
            import.next_run(ResultStatus::Reclaimed, 7, 5, started, now),
            NextRun::At(now)
        );
    }

    #[test]
    fn test_suspended_import_stays_idle() {
        let mut import = git_import();
        import.review_status = ReviewStatus::Suspended;
        let now = Utc::now();
        assert_eq!(
            import.next_run(ResultStatus::Success, 0, 5, now, now),
            NextRun::Idle
        );
    }

    #[test]
    fn test_validate_definition() {
        assert!(validate_definition(RcsType::Git, TargetRcsType::Git, Some("https://x"), None, None).is_ok());
        assert!(validate_definition(RcsType::Cvs, TargetRcsType::Bzr, None, Some(":pserver:x"), Some("m")).is_ok());
        assert!(validate_definition(RcsType::Cvs, TargetRcsType::Git, None, Some("r"), Some("m")).is_err());
        assert!(validate_definition(RcsType::Bzr, TargetRcsType::Bzr, None, None, None).is_err());
        assert!(validate_definition(RcsType::Cvs, TargetRcsType::Bzr, None, Some("r"), None).is_err());
    }
}
