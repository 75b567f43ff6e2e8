//! Worker-facing RPC payloads
//!
//! Request and response bodies for the four `POST /rpc/<method>` calls used
//! by dispatchers and workers, plus the fault body returned on errors.

use serde::{Deserialize, Serialize};

/// `getJobForMachine` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobForMachineRequest {
    pub hostname: String,
    pub worker_limit: u32,
}

/// `getJobForMachine` response; `job_id` is 0 when nothing was claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobForMachineResponse {
    pub job_id: i64,
}

/// `getImportDataForJobID` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDataRequest {
    pub job_id: i64,
}

/// Everything a worker needs to run its job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportData {
    /// Worker argument vector, see `SourceDetails::from_arguments`
    pub arguments: Vec<String>,

    /// Location of the hosted copy the import writes to
    pub target_url: String,

    /// Name to upload the worker log under
    pub log_file_name: String,

    /// Hosts the default access policy refuses to import from
    pub blacklisted_hostnames: Vec<String>,
}

/// `updateHeartbeat` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub job_id: i64,
    pub log_tail: String,
}

/// `finishJobID` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishJobRequest {
    pub job_id: i64,

    /// One of the `ResultStatus` names; validated by the scheduler
    pub status_name: String,

    /// Alias URL of the uploaded log, if the upload succeeded
    #[serde(default)]
    pub log_file_alias_url: Option<String>,
}

/// Typed fault names carried in error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    NoSuchCodeImportJob,
    InvalidStatus,
    NotFound,
}

/// Error body returned by every scheduler endpoint
///
/// `fault` is present only for the typed RPC faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultCode>,
    pub error: String,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCode::NoSuchCodeImportJob => "NoSuchCodeImportJob",
            FaultCode::InvalidStatus => "InvalidStatus",
            FaultCode::NotFound => "NotFound",
        }
    }
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_body_shape() {
        let body = ErrorBody {
            fault: Some(FaultCode::NoSuchCodeImportJob),
            error: "job 7 is not running".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["fault"], "NoSuchCodeImportJob");
        assert_eq!(json["error"], "job 7 is not running");
    }

    #[test]
    fn test_plain_error_body_has_no_fault() {
        let body: ErrorBody = serde_json::from_str(r#"{"error":"database error"}"#).unwrap();
        assert!(body.fault.is_none());
        assert!(!serde_json::to_string(&body).unwrap().contains("fault"));
    }

    #[test]
    fn test_finish_request_without_log() {
        let request: FinishJobRequest =
            serde_json::from_str(r#"{"job_id":3,"status_name":"SUCCESS"}"#).unwrap();
        assert_eq!(request.log_file_alias_url, None);
    }
}
