//! RPC API Handlers
//!
//! The calls dispatchers and workers make while running imports. Errors come
//! back as typed faults (`NoSuchCodeImportJob`, `InvalidStatus`, `NotFound`).

use axum::{Json, extract::State, http::StatusCode};
use ferry_core::dto::rpc::{
    FinishJobRequest, HeartbeatRequest, ImportData, ImportDataRequest, JobForMachineRequest,
    JobForMachineResponse,
};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::job_service;

/// POST /rpc/getJobForMachine
/// Claim the next due job for a machine; `job_id` 0 means none
pub async fn get_job_for_machine(
    State(state): State<AppState>,
    Json(req): Json<JobForMachineRequest>,
) -> ApiResult<Json<JobForMachineResponse>> {
    tracing::debug!(
        "Machine {} asking for work (limit {})",
        req.hostname,
        req.worker_limit
    );

    let job_id =
        job_service::get_job_for_machine(state.store.as_ref(), &req.hostname, req.worker_limit)
            .await?;

    Ok(Json(JobForMachineResponse { job_id }))
}

/// POST /rpc/getImportDataForJobID
pub async fn get_import_data_for_job_id(
    State(state): State<AppState>,
    Json(req): Json<ImportDataRequest>,
) -> ApiResult<Json<ImportData>> {
    tracing::debug!("Import data requested for job {}", req.job_id);

    let data = job_service::get_import_data(state.store.as_ref(), &state.config, req.job_id).await?;

    Ok(Json(data))
}

/// POST /rpc/updateHeartbeat
pub async fn update_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<StatusCode> {
    job_service::update_heartbeat(state.store.as_ref(), req.job_id, &req.log_tail).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /rpc/finishJobID
pub async fn finish_job_id(
    State(state): State<AppState>,
    Json(req): Json<FinishJobRequest>,
) -> ApiResult<StatusCode> {
    tracing::info!("Finishing job {} with status {}", req.job_id, req.status_name);

    job_service::finish_job(state.store.as_ref(), &state.config, req).await?;

    Ok(StatusCode::NO_CONTENT)
}
