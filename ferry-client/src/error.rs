//! Error types for the Ferry client

use ferry_core::dto::rpc::{ErrorBody, FaultCode};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Ferry client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The scheduler rejected an RPC call with a typed fault
    #[error("{fault}: {message}")]
    Fault {
        fault: FaultCode,
        /// HTTP status code
        status: u16,
        message: String,
    },

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Builds the error for a failed response from its status and body
    ///
    /// Bodies in the scheduler's `ErrorBody` shape keep their fault code;
    /// anything else is reported verbatim.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                fault: Some(fault),
                error,
            }) => Self::Fault {
                fault,
                status,
                message: error,
            },
            Ok(ErrorBody { fault: None, error }) => Self::api_error(status, error),
            Err(_) => Self::api_error(status, body),
        }
    }

    /// The fault code, if the scheduler sent one
    pub fn fault(&self) -> Option<FaultCode> {
        match self {
            Self::Fault { fault, .. } => Some(*fault),
            _ => None,
        }
    }

    /// The job no longer exists or is not RUNNING
    pub fn is_no_such_job(&self) -> bool {
        self.fault() == Some(FaultCode::NoSuchCodeImportJob)
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ApiError { status: 404, .. } | Self::Fault { status: 404, .. }
        )
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::ApiError { status, .. } | Self::Fault { status, .. } => {
                (400..500).contains(status)
            }
            _ => false,
        }
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}
