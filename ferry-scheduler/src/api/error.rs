//! API Error Handling
//!
//! Unified error types and conversion for API responses. Every error body is
//! an `ErrorBody`; the typed RPC faults also carry their fault name.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ferry_core::dto::rpc::{ErrorBody, FaultCode};

use crate::repository::StoreError;
use crate::service::{import_service, job_service, librarian_service, machine_service};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    Fault(FaultCode, String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    StoreError(StoreError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, fault, message) = match self {
            ApiError::Fault(fault, msg) => {
                let status = match fault {
                    FaultCode::InvalidStatus => StatusCode::BAD_REQUEST,
                    FaultCode::NoSuchCodeImportJob | FaultCode::NotFound => StatusCode::NOT_FOUND,
                };
                (status, Some(fault), msg)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, None, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, None, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, None, msg),
            ApiError::StoreError(StoreError::Conflict(msg)) => (StatusCode::CONFLICT, None, msg),
            ApiError::StoreError(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    None,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, None, msg)
            }
        };

        (
            status,
            Json(ErrorBody {
                fault,
                error: message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::StoreError(err)
    }
}

impl From<job_service::JobError> for ApiError {
    fn from(err: job_service::JobError) -> Self {
        use job_service::JobError;
        match err {
            JobError::NoSuchJob(id) => ApiError::Fault(
                FaultCode::NoSuchCodeImportJob,
                format!("No running job with id {}", id),
            ),
            JobError::InvalidStatus(name) => ApiError::Fault(
                FaultCode::InvalidStatus,
                format!("'{}' is not a valid result status", name),
            ),
            JobError::LogFileNotFound(url) => ApiError::Fault(
                FaultCode::NotFound,
                format!("No stored log file at {}", url),
            ),
            JobError::ValidationError(msg) => ApiError::BadRequest(msg),
            JobError::StoreError(err) => ApiError::StoreError(err),
        }
    }
}

impl From<machine_service::MachineError> for ApiError {
    fn from(err: machine_service::MachineError) -> Self {
        use machine_service::MachineError;
        match err {
            MachineError::NotFound(hostname) => {
                ApiError::NotFound(format!("Machine {} not found", hostname))
            }
            MachineError::AlreadyRegistered(msg) => ApiError::Conflict(msg),
            MachineError::InvalidTransition { from, to } => ApiError::BadRequest(format!(
                "Cannot move machine from {} to {}",
                from, to
            )),
            MachineError::ValidationError(msg) => ApiError::BadRequest(msg),
            MachineError::StoreError(err) => ApiError::StoreError(err),
        }
    }
}

impl From<import_service::ImportError> for ApiError {
    fn from(err: import_service::ImportError) -> Self {
        use import_service::ImportError;
        match err {
            ImportError::NotFound(id) => ApiError::NotFound(format!("Import {} not found", id)),
            ImportError::ValidationError(msg) => ApiError::BadRequest(msg),
            ImportError::Conflict(msg) => ApiError::Conflict(msg),
            ImportError::StoreError(err) => ApiError::StoreError(err),
        }
    }
}

impl From<librarian_service::LibrarianError> for ApiError {
    fn from(err: librarian_service::LibrarianError) -> Self {
        use librarian_service::LibrarianError;
        match err {
            LibrarianError::NotFound(id) => {
                ApiError::NotFound(format!("Log file {} not found", id))
            }
            LibrarianError::ValidationError(msg) => ApiError::BadRequest(msg),
            LibrarianError::StoreError(err) => ApiError::StoreError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
