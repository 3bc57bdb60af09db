//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use conduit_core::domain::pipeline::{PipelineId, PipelineInfo};
use conduit_core::dto::pipeline::CreatePipelineQuery;
use conduit_core::duration::parse_duration;
use conduit_core::params::split_params;
use std::sync::Arc;
use std::time::Duration;

use crate::api::error::{ApiError, ApiResult};
use crate::pipeline::Pipeline;
use crate::service::Coordinator;

/// Parses the `{id}` path segment before anything touches the registry
fn parse_id(raw: &str) -> ApiResult<PipelineId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid pipeline id '{}'", raw)))
}

fn find_pipeline(coordinator: &Coordinator, raw: &str) -> ApiResult<Arc<Pipeline>> {
    let id = parse_id(raw)?;
    coordinator
        .registry()
        .lookup(id)
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline {} not found", id)))
}

/// Query values that are present but empty count as absent
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// GET /pipelines
/// List all pipeline identities
pub async fn list_pipelines(State(coordinator): State<Arc<Coordinator>>) -> Json<Vec<PipelineId>> {
    tracing::debug!("Listing all pipelines");
    Json(coordinator.list_all())
}

/// GET /running
/// List identities of running pipelines
pub async fn list_running(State(coordinator): State<Arc<Coordinator>>) -> Json<Vec<PipelineId>> {
    tracing::debug!("Listing running pipelines");
    Json(coordinator.list_running())
}

/// POST /pipeline
/// Create a new pipeline from the script in the request body
pub async fn create_pipeline(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<CreatePipelineQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<PipelineInfo>)> {
    let script = String::from_utf8(body.to_vec())
        .map_err(|_| ApiError::BadRequest("Pipeline script must be valid UTF-8".to_string()))?;

    if script.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Pipeline script cannot be empty".to_string(),
        ));
    }

    let delay: Option<Duration> = non_empty(query.delay)
        .map(|raw| {
            parse_duration(&raw).map_err(|e| ApiError::BadRequest(format!("Invalid delay: {}", e)))
        })
        .transpose()?;

    let params = match non_empty(query.params) {
        Some(raw) => split_params(&raw).map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => Vec::new(),
    };

    tracing::info!("Creating pipeline with {} parameter(s)", params.len());

    let pipeline = coordinator.create_pipeline(script, delay, params)?;

    Ok((StatusCode::CREATED, Json(pipeline.info())))
}

/// GET /pipeline/{id}
/// Get pipeline by ID
pub async fn get_pipeline(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PipelineInfo>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = find_pipeline(&coordinator, &id)?;
    Ok(Json(pipeline.info()))
}

/// GET /pipeline/{id}/out
/// Output captured so far
pub async fn get_output(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    tracing::debug!("Getting output of pipeline: {}", id);

    let pipeline = find_pipeline(&coordinator, &id)?;
    let output = pipeline.output()?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        output,
    ))
}

/// DELETE /pipeline/{id}
/// Kill a pipeline
pub async fn kill_pipeline(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PipelineInfo>> {
    tracing::info!("Killing pipeline: {}", id);

    let pipeline = find_pipeline(&coordinator, &id)?;
    pipeline.kill().await?;

    Ok(Json(pipeline.info()))
}
