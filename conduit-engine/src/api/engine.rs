//! Engine API Handlers
//!
//! Process-wide metadata endpoints.

use axum::{Json, extract::State};
use conduit_core::domain::engine::EngineInfo;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::service::Coordinator;

/// GET /info
/// Engine metadata and pipeline counts
pub async fn info(State(coordinator): State<Arc<Coordinator>>) -> Json<EngineInfo> {
    Json(coordinator.info())
}

/// GET /capabilities
/// Capability descriptor discovered at startup
pub async fn capabilities(State(coordinator): State<Arc<Coordinator>>) -> Json<JsonValue> {
    Json(coordinator.capabilities().clone())
}
