//! Librarian API Handlers
//!
//! Log upload and download. Uploads answer with the alias URL workers pass
//! to `finishJobID`.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use ferry_core::dto::librarian::{LogFileAlias, UploadLogFile};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::librarian_service;

/// POST /librarian/upload
pub async fn upload_log_file(
    State(state): State<AppState>,
    Json(req): Json<UploadLogFile>,
) -> ApiResult<(StatusCode, Json<LogFileAlias>)> {
    tracing::debug!("Uploading log file {}", req.filename);

    let alias =
        librarian_service::upload_log_file(state.store.as_ref(), &state.config.public_url, req)
            .await?;

    Ok((StatusCode::CREATED, Json(alias)))
}

/// GET /librarian/{id}/{filename}
pub async fn get_log_file(
    State(state): State<AppState>,
    Path((id, filename)): Path<(Uuid, String)>,
) -> ApiResult<impl IntoResponse> {
    let log_file = librarian_service::get_log_file(state.store.as_ref(), id, &filename).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        log_file.content,
    ))
}
