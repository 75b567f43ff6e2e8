//! Import API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ferry_core::domain::code_import::CodeImport;
use ferry_core::domain::job::Job;
use ferry_core::domain::result::ImportResult;
use ferry_core::dto::import::{CreateCodeImport, RequestImport};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::import_service;

/// POST /import/create
pub async fn create_import(
    State(state): State<AppState>,
    Json(req): Json<CreateCodeImport>,
) -> ApiResult<(StatusCode, Json<CodeImport>)> {
    tracing::info!("Creating import into {}", req.target_name);

    let import = import_service::create_import(state.store.as_ref(), req).await?;

    Ok((StatusCode::CREATED, Json(import)))
}

/// GET /import/list
pub async fn list_imports(State(state): State<AppState>) -> ApiResult<Json<Vec<CodeImport>>> {
    let imports = import_service::list_imports(state.store.as_ref()).await?;
    Ok(Json(imports))
}

/// GET /import/{id}
pub async fn get_import(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CodeImport>> {
    let import = import_service::get_import(state.store.as_ref(), id).await?;
    Ok(Json(import))
}

/// POST /import/{id}/request
/// Move the import's job to the front of the queue
pub async fn request_import(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<RequestImport>,
) -> ApiResult<Json<Job>> {
    tracing::info!("Import {} requested by {}", id, req.requested_by);

    let job = import_service::request_import(state.store.as_ref(), id, req).await?;

    Ok(Json(job))
}

/// GET /import/{id}/results
pub async fn list_results(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ImportResult>>> {
    let results = import_service::list_results(state.store.as_ref(), id).await?;
    Ok(Json(results))
}
