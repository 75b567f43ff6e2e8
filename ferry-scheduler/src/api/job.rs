//! Job API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use ferry_core::domain::job::Job;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::job_service;

/// GET /job/list
/// Queued and running jobs, soonest due first
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<Job>>> {
    tracing::debug!("Listing jobs");

    let jobs = job_service::list_jobs(state.store.as_ref()).await?;

    Ok(Json(jobs))
}

/// GET /job/{id}
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = job_service::get_job(state.store.as_ref(), id).await?;

    Ok(Json(job))
}
