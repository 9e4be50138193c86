//! HTTP request handlers.

use super::AppState;
use crate::state::{HistoryResponse, Snapshot};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;

// ============================================================================
// API: Services
// ============================================================================

pub async fn handle_get_services(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.store.snapshot().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Restrict the response to one target.
    pub name: Option<String>,
}

pub async fn handle_get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    Json(state.store.history(query.name.as_deref(), Utc::now()).await)
}

pub async fn handle_api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

// ============================================================================
// Liveness
// ============================================================================

pub async fn handle_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
