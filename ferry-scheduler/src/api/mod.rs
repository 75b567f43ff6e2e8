//! API Module
//!
//! HTTP API layer for the scheduler.
//! Each submodule handles endpoints for a specific domain; `rpc` holds the
//! four calls dispatchers and workers make.

pub mod error;
pub mod event;
pub mod health;
pub mod import;
pub mod job;
pub mod librarian;
pub mod machine;
pub mod rpc;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::repository::Store;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Worker-facing RPC
        .route("/rpc/getJobForMachine", post(rpc::get_job_for_machine))
        .route("/rpc/getImportDataForJobID", post(rpc::get_import_data_for_job_id))
        .route("/rpc/updateHeartbeat", post(rpc::update_heartbeat))
        .route("/rpc/finishJobID", post(rpc::finish_job_id))
        // Machine endpoints
        .route("/machine/list", get(machine::list_machines))
        .route("/machine/register", post(machine::register_machine))
        .route("/machine/{hostname}", get(machine::get_machine_status))
        .route("/machine/{hostname}/state", post(machine::set_machine_state))
        // Import endpoints
        .route("/import/create", post(import::create_import))
        .route("/import/list", get(import::list_imports))
        .route("/import/{id}", get(import::get_import))
        .route("/import/{id}/request", post(import::request_import))
        .route("/import/{id}/results", get(import::list_results))
        // Job endpoints
        .route("/job/list", get(job::list_jobs))
        .route("/job/{id}", get(job::get_job))
        // Event log
        .route("/event/list", get(event::list_events))
        // Log files
        .route("/librarian/upload", post(librarian::upload_log_file))
        .route("/librarian/{id}/{filename}", get(librarian::get_log_file))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
