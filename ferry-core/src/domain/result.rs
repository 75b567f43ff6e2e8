//! Import result domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Outcome of one finished import attempt
///
/// Created exactly once when a job finishes (normally or by being reclaimed)
/// and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub id: i64,
    pub code_import_id: i64,
    pub machine: Option<String>,
    pub status: ResultStatus,
    /// Alias of the uploaded worker log, if one was supplied
    pub log_file: Option<Uuid>,
    /// Last log tail the job reported before finishing
    pub log_excerpt: Option<String>,
    pub date_job_started: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
}

/// Closed set of outcome statuses accepted by `finishJobID`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Success,
    SuccessNochange,
    SuccessPartial,
    Failure,
    FailureInvalid,
    FailureUnsupportedFeature,
    FailureForbidden,
    FailureRemoteBroken,
    Reclaimed,
    Killed,
    Interrupted,
}

/// Error returned when a status name is not part of the closed set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid result status: {0}")]
pub struct InvalidStatus(pub String);

impl ResultStatus {
    pub const ALL: [ResultStatus; 11] = [
        ResultStatus::Success,
        ResultStatus::SuccessNochange,
        ResultStatus::SuccessPartial,
        ResultStatus::Failure,
        ResultStatus::FailureInvalid,
        ResultStatus::FailureUnsupportedFeature,
        ResultStatus::FailureForbidden,
        ResultStatus::FailureRemoteBroken,
        ResultStatus::Reclaimed,
        ResultStatus::Killed,
        ResultStatus::Interrupted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "SUCCESS",
            ResultStatus::SuccessNochange => "SUCCESS_NOCHANGE",
            ResultStatus::SuccessPartial => "SUCCESS_PARTIAL",
            ResultStatus::Failure => "FAILURE",
            ResultStatus::FailureInvalid => "FAILURE_INVALID",
            ResultStatus::FailureUnsupportedFeature => "FAILURE_UNSUPPORTED_FEATURE",
            ResultStatus::FailureForbidden => "FAILURE_FORBIDDEN",
            ResultStatus::FailureRemoteBroken => "FAILURE_REMOTE_BROKEN",
            ResultStatus::Reclaimed => "RECLAIMED",
            ResultStatus::Killed => "KILLED",
            ResultStatus::Interrupted => "INTERRUPTED",
        }
    }

    /// Whether this status resets the consecutive failure count
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResultStatus::Success | ResultStatus::SuccessNochange | ResultStatus::SuccessPartial
        )
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResultStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_status() {
        assert_eq!("SUCCESS".parse::<ResultStatus>(), Ok(ResultStatus::Success));
        assert_eq!(
            "FAILURE_REMOTE_BROKEN".parse::<ResultStatus>(),
            Ok(ResultStatus::FailureRemoteBroken)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_status() {
        let err = "NOT_A_REAL_STATUS".parse::<ResultStatus>().unwrap_err();
        assert_eq!(err, InvalidStatus("NOT_A_REAL_STATUS".to_string()));
        assert!("success".parse::<ResultStatus>().is_err());
    }

    #[test]
    fn test_serde_names_match_wire_names() {
        for status in ResultStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_successes() {
        assert!(ResultStatus::SuccessPartial.is_success());
        assert!(!ResultStatus::Reclaimed.is_success());
    }
}
