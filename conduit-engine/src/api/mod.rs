//! API Module
//!
//! HTTP API layer for the engine.
//! Each submodule handles endpoints for a specific domain.

pub mod engine;
pub mod error;
pub mod health;
pub mod pipeline;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::Coordinator;

/// Create the main API router with all endpoints
pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        // Engine endpoints
        .route("/ping", get(health::ping))
        .route("/info", get(engine::info))
        .route("/capabilities", get(engine::capabilities))
        // Pipeline endpoints
        .route("/pipelines", get(pipeline::list_pipelines))
        .route("/running", get(pipeline::list_running))
        .route("/pipeline", post(pipeline::create_pipeline))
        .route(
            "/pipeline/{id}",
            get(pipeline::get_pipeline).delete(pipeline::kill_pipeline),
        )
        .route("/pipeline/{id}/out", get(pipeline::get_output))
        // Add state and middleware
        .with_state(coordinator)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
    };
    use conduit_core::domain::pipeline::{PipelineInfo, PipelineStatus};
    use serde_json::Value as JsonValue;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::config::Config;

    fn router_with(config: Config) -> (Router, Arc<Coordinator>) {
        let coordinator = Arc::new(Coordinator::new(
            &config,
            serde_json::json!({ "engine": "subprocess" }),
        ));
        (create_router(coordinator.clone()), coordinator)
    }

    fn router() -> (Router, Arc<Coordinator>) {
        router_with(Config::default())
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn create(app: &Router, query: &str, script: &str) -> PipelineInfo {
        let (status, body) = send(app, Method::POST, &format!("/pipeline{}", query), script).await;
        assert_eq!(status, StatusCode::CREATED, "{}", String::from_utf8_lossy(&body));
        serde_json::from_slice(&body).unwrap()
    }

    fn error_message(body: &[u8]) -> String {
        let value: JsonValue = serde_json::from_slice(body).unwrap();
        value["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_ping() {
        let (app, _) = router();
        let (status, body) = send(&app, Method::GET, "/ping", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"pong\n");
    }

    #[tokio::test]
    async fn test_info_and_capabilities() {
        let (app, _) = router();

        let (status, body) = send(&app, Method::GET, "/info", "").await;
        assert_eq!(status, StatusCode::OK);
        let info: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["executable"], "sh");
        assert_eq!(info["pipelines"], 0);

        let (status, body) = send(&app, Method::GET, "/capabilities", "").await;
        assert_eq!(status, StatusCode::OK);
        let capabilities: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(capabilities["engine"], "subprocess");
    }

    #[tokio::test]
    async fn test_empty_listings() {
        let (app, _) = router();

        for uri in ["/pipelines", "/running"] {
            let (status, body) = send(&app, Method::GET, uri, "").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, b"[]");
        }
    }

    #[tokio::test]
    async fn test_create_rejects_bad_requests() {
        let (app, coordinator) = router();

        let (status, body) = send(&app, Method::POST, "/pipeline", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).contains("empty"));

        let (status, _) = send(&app, Method::POST, "/pipeline", "  \n\t").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, Method::POST, "/pipeline?delay=soon", "echo hi").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).contains("delay"));

        let (status, _) = send(&app, Method::POST, "/pipeline?delay=-1s", "echo hi").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/pipeline?params=%22unterminated",
            "echo hi",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_missing_executable_is_precondition_failure() {
        let (app, coordinator) = router_with(Config::new("conduit-no-such-binary", vec![]));

        let (status, body) = send(&app, Method::POST, "/pipeline", "echo hi").await;

        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert!(error_message(&body).contains("conduit-no-such-binary"));
        assert!(coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_create_get_and_kill() {
        let (app, _) = router();

        let created = create(&app, "?delay=1m", "sleep 30").await;
        assert_eq!(created.id.0, 1);
        assert_eq!(created.status, PipelineStatus::Pending);
        assert_eq!(created.delay_ms, 60_000);
        assert_eq!(created.definition.script, "sleep 30");

        let (status, body) = send(&app, Method::GET, "/pipeline/1", "").await;
        assert_eq!(status, StatusCode::OK);
        let fetched: PipelineInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(fetched.id, created.id);

        let (status, body) = send(&app, Method::GET, "/pipelines", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[1]");

        let (status, body) = send(&app, Method::DELETE, "/pipeline/1", "").await;
        assert_eq!(status, StatusCode::OK);
        let killed: PipelineInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(killed.status, PipelineStatus::Killed);
        assert!(killed.finished_at.is_some());

        // Killing again is a no-op
        let (status, _) = send(&app, Method::DELETE, "/pipeline/1", "").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bad_and_unknown_ids() {
        let (app, _) = router();

        for (method, suffix) in [
            (Method::GET, ""),
            (Method::GET, "/out"),
            (Method::DELETE, ""),
        ] {
            let (status, _) = send(&app, method.clone(), &format!("/pipeline/abc{}", suffix), "").await;
            assert_eq!(status, StatusCode::BAD_REQUEST);

            let (status, body) =
                send(&app, method, &format!("/pipeline/999999{}", suffix), "").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert!(error_message(&body).contains("999999"));
        }
    }

    #[tokio::test]
    async fn test_output_of_pending_pipeline_is_empty() {
        let (app, coordinator) = router();
        create(&app, "?delay=1m", "echo never").await;

        let request = Request::builder()
            .uri("/pipeline/1/out")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_pipeline_output_end_to_end() {
        let (app, coordinator) = router();

        let created = create(
            &app,
            "?delay=0s&params=first%20%27second%20arg%27",
            r#"echo "$0|$1""#,
        )
        .await;

        let pipeline = coordinator.registry().lookup(created.id).unwrap();
        tokio::time::timeout(Duration::from_secs(10), pipeline.wait())
            .await
            .unwrap();

        let (status, body) = send(&app, Method::GET, "/pipeline/1/out", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"first|second arg\n");

        let (_, body) = send(&app, Method::GET, "/pipeline/1", "").await;
        let info: PipelineInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.status, PipelineStatus::Finished);
        assert_eq!(info.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_running_listing_and_kill() {
        let (app, coordinator) = router();

        let created = create(&app, "?delay=0s", "sleep 30").await;
        let pipeline = coordinator.registry().lookup(created.id).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while pipeline.status() != PipelineStatus::Running {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (status, body) = send(&app, Method::GET, "/running", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[1]");

        let (status, _) = send(&app, Method::DELETE, "/pipeline/1", "").await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/running", "").await;
        assert_eq!(body, b"[]");
        assert_eq!(pipeline.status(), PipelineStatus::Killed);
    }
}
