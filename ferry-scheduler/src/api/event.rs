//! Event API Handlers

use axum::{
    Json,
    extract::{Query, State},
};
use ferry_core::domain::event::ImportEvent;
use serde::Deserialize;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::import_service;

const DEFAULT_EVENT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub limit: Option<i64>,
}

/// GET /event/list?limit=N
/// Most recent events, newest first
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventQuery>,
) -> ApiResult<Json<Vec<ImportEvent>>> {
    let limit = params.limit.unwrap_or(DEFAULT_EVENT_LIMIT);

    let events = import_service::list_events(state.store.as_ref(), limit).await?;

    Ok(Json(events))
}
