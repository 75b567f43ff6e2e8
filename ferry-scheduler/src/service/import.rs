//! Import Service
//!
//! Business logic for import definitions, operator run requests, results
//! and the event log.

use chrono::Utc;
use ferry_core::domain::code_import::CodeImport;
use ferry_core::domain::event::ImportEvent;
use ferry_core::domain::job::Job;
use ferry_core::domain::result::ImportResult;
use ferry_core::dto::import::{CreateCodeImport, RequestImport};

use crate::repository::{ImportStore, Store, StoreError};

/// Largest page of events returned at once
pub const MAX_EVENT_LIMIT: i64 = 500;

/// Service error type
#[derive(Debug)]
pub enum ImportError {
    NotFound(i64),
    ValidationError(String),
    Conflict(String),
    StoreError(StoreError),
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ImportError::Conflict(msg),
            other => ImportError::StoreError(other),
        }
    }
}

/// Create a new import; its first job is due immediately
pub async fn create_import(
    store: &dyn Store,
    req: CreateCodeImport,
) -> Result<CodeImport, ImportError> {
    req.validate().map_err(ImportError::ValidationError)?;

    let import = store.create_import(&req, Utc::now()).await?;

    tracing::info!(
        "Import {} created: {} from {}",
        import.id,
        import.target_name,
        import.rcs_type
    );
    Ok(import)
}

/// Get an import by ID
pub async fn get_import(store: &dyn Store, id: i64) -> Result<CodeImport, ImportError> {
    store.find_import(id).await?.ok_or(ImportError::NotFound(id))
}

/// List all imports
pub async fn list_imports(store: &dyn Store) -> Result<Vec<CodeImport>, ImportError> {
    Ok(store.list_imports().await?)
}

/// Ask for an import to run as soon as a machine is free
pub async fn request_import(
    store: &dyn Store,
    id: i64,
    req: RequestImport,
) -> Result<Job, ImportError> {
    if req.requested_by.trim().is_empty() {
        return Err(ImportError::ValidationError(
            "requested_by cannot be empty".to_string(),
        ));
    }

    let job = store
        .request_import(id, &req.requested_by, Utc::now())
        .await?
        .ok_or(ImportError::NotFound(id))?;

    tracing::info!("Import {} requested by {}", id, req.requested_by);
    Ok(job)
}

/// Results of an import, newest first
pub async fn list_results(store: &dyn Store, id: i64) -> Result<Vec<ImportResult>, ImportError> {
    store.find_import(id).await?.ok_or(ImportError::NotFound(id))?;
    Ok(store.list_results(id).await?)
}

/// Most recent events, newest first
pub async fn list_events(store: &dyn Store, limit: i64) -> Result<Vec<ImportEvent>, ImportError> {
    if limit <= 0 {
        return Err(ImportError::ValidationError(
            "limit must be greater than 0".to_string(),
        ));
    }

    Ok(store.list_events(limit.min(MAX_EVENT_LIMIT)).await?)
}
