//! Machine API Handlers
//!
//! HTTP endpoints for the machine registry.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ferry_core::domain::machine::Machine;
use ferry_core::dto::machine::{MachineStatus, RegisterMachine, SetMachineState};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::machine_service;

/// POST /machine/register
/// Register a new machine (starts OFFLINE)
pub async fn register_machine(
    State(state): State<AppState>,
    Json(req): Json<RegisterMachine>,
) -> ApiResult<(StatusCode, Json<Machine>)> {
    tracing::info!("Registering machine: {}", req.hostname);

    let machine = machine_service::register_machine(state.store.as_ref(), req).await?;

    Ok((StatusCode::CREATED, Json(machine)))
}

/// GET /machine/list
pub async fn list_machines(State(state): State<AppState>) -> ApiResult<Json<Vec<Machine>>> {
    tracing::debug!("Listing machines");

    let machines = machine_service::list_machines(state.store.as_ref()).await?;

    Ok(Json(machines))
}

/// GET /machine/{hostname}
/// Machine state and running job count, as read by dispatchers
pub async fn get_machine_status(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> ApiResult<Json<MachineStatus>> {
    tracing::debug!("Getting machine status: {}", hostname);

    let status = machine_service::get_machine_status(state.store.as_ref(), &hostname).await?;

    Ok(Json(status))
}

/// POST /machine/{hostname}/state
/// Move a machine to ONLINE, QUIESCING or OFFLINE
pub async fn set_machine_state(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
    Json(req): Json<SetMachineState>,
) -> ApiResult<Json<Machine>> {
    tracing::info!("Setting machine {} to {}", hostname, req.state);

    let machine = machine_service::set_machine_state(state.store.as_ref(), &hostname, req).await?;

    Ok(Json(machine))
}
