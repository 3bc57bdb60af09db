//! Health Check API Handler
//!
//! Liveness endpoint for monitoring.

use axum::{http::StatusCode, response::IntoResponse};

/// GET /ping
/// Liveness check
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong\n")
}
