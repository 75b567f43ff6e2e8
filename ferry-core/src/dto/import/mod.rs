//! Code import DTOs

use serde::{Deserialize, Serialize};

use crate::domain::code_import::{MAX_UPDATE_INTERVAL_SECS, validate_definition};
use crate::domain::source::{RcsType, TargetRcsType};

/// Request to create a new code import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCodeImport {
    pub target_name: String,
    pub rcs_type: RcsType,
    pub target_rcs_type: TargetRcsType,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cvs_root: Option<String>,
    #[serde(default)]
    pub cvs_module: Option<String>,
    /// Seconds between runs; per-rcs default when omitted
    #[serde(default)]
    pub update_interval: Option<i64>,
}

/// Request to run an import as soon as possible
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestImport {
    pub requested_by: String,
}

impl CreateCodeImport {
    pub fn validate(&self) -> Result<(), String> {
        if self.target_name.trim().is_empty() {
            return Err("target_name cannot be empty".to_string());
        }
        if self.update_interval.is_some_and(|seconds| seconds <= 0) {
            return Err("update_interval must be positive".to_string());
        }
        if self
            .update_interval
            .is_some_and(|seconds| seconds > MAX_UPDATE_INTERVAL_SECS)
        {
            return Err(format!(
                "update_interval cannot exceed {} seconds",
                MAX_UPDATE_INTERVAL_SECS
            ));
        }
        validate_definition(
            self.rcs_type,
            self.target_rcs_type,
            self.url.as_deref(),
            self.cvs_root.as_deref(),
            self.cvs_module.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_from_json() {
        let request: CreateCodeImport = serde_json::from_str(
            r#"{"target_name":"~bob/app/trunk","rcs_type":"BZR_SVN","target_rcs_type":"BZR","url":"svn://svn.example.com/app/trunk"}"#,
        )
        .unwrap();
        assert_eq!(request.rcs_type, RcsType::BzrSvn);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_empty_target_name_is_rejected() {
        let request = CreateCodeImport {
            target_name: " ".to_string(),
            rcs_type: RcsType::Git,
            target_rcs_type: TargetRcsType::Git,
            url: Some("https://example.com/x.git".to_string()),
            cvs_root: None,
            cvs_module: None,
            update_interval: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_update_interval_is_bounded() {
        let mut request = CreateCodeImport {
            target_name: "~alice/widget/+git/main".to_string(),
            rcs_type: RcsType::Git,
            target_rcs_type: TargetRcsType::Git,
            url: Some("https://example.com/x.git".to_string()),
            cvs_root: None,
            cvs_module: None,
            update_interval: Some(10_000_000_000_000),
        };
        assert!(request.validate().is_err());

        request.update_interval = Some(MAX_UPDATE_INTERVAL_SECS);
        assert!(request.validate().is_ok());
    }
}
