//! Librarian Service
//!
//! Stores worker log files and serves them back by alias.

use chrono::Utc;
use ferry_core::dto::librarian::{LogFileAlias, UploadLogFile};
use uuid::Uuid;

use crate::repository::{LogFileStore, Store, StoreError, StoredLogFile};

/// Service error type
#[derive(Debug)]
pub enum LibrarianError {
    NotFound(Uuid),
    ValidationError(String),
    StoreError(StoreError),
}

impl From<StoreError> for LibrarianError {
    fn from(err: StoreError) -> Self {
        LibrarianError::StoreError(err)
    }
}

/// Store an uploaded log and return its alias
pub async fn upload_log_file(
    store: &dyn Store,
    public_url: &str,
    req: UploadLogFile,
) -> Result<LogFileAlias, LibrarianError> {
    validate_filename(&req.filename)?;

    let log_file = store
        .store_log_file(&req.filename, &req.content, Utc::now())
        .await?;

    tracing::info!(
        "Stored log file {} ({} bytes) as {}",
        log_file.filename,
        log_file.content.len(),
        log_file.id
    );

    Ok(LogFileAlias {
        id: log_file.id,
        url: alias_url(public_url, &log_file),
    })
}

/// Fetch a stored log; the filename must match the one it was uploaded under
pub async fn get_log_file(
    store: &dyn Store,
    id: Uuid,
    filename: &str,
) -> Result<StoredLogFile, LibrarianError> {
    store
        .find_log_file(id)
        .await?
        .filter(|log_file| log_file.filename == filename)
        .ok_or(LibrarianError::NotFound(id))
}

/// Public URL of a stored log file
pub fn alias_url(public_url: &str, log_file: &StoredLogFile) -> String {
    format!(
        "{}/librarian/{}/{}",
        public_url.trim_end_matches('/'),
        log_file.id,
        log_file.filename
    )
}

fn validate_filename(filename: &str) -> Result<(), LibrarianError> {
    if filename.is_empty() || filename.contains('/') || filename.starts_with('.') {
        return Err(LibrarianError::ValidationError(format!(
            "invalid log file name '{}'",
            filename
        )));
    }
    Ok(())
}
