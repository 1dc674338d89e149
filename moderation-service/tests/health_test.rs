mod common;

use axum::http::{header, StatusCode};
use common::TestApp;

#[tokio::test]
async fn health_reports_store_status() {
    let app = TestApp::new().await;

    let healthy = app.get("/health", None).await;
    assert_eq!(healthy.status, StatusCode::OK);
    assert_eq!(healthy.body["status"], "healthy");
    assert_eq!(healthy.body["service"], "moderation-service");
    assert_eq!(healthy.body["checks"]["store"], "up");

    app.store.fail_on("health_check");
    let unhealthy = app.get("/health", None).await;
    assert_eq!(unhealthy.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(unhealthy.body["checks"]["store"], "down");
}

#[tokio::test]
async fn responses_carry_security_headers_and_request_id() {
    let app = TestApp::new().await;
    let response = app.get("/health", None).await;

    assert_eq!(response.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(response.headers[header::CACHE_CONTROL], "no-store");
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn metrics_endpoint_is_public() {
    let app = TestApp::new().await;
    let response = app.get("/metrics", None).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = TestApp::new().await;
    let response = app.get("/nope", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
