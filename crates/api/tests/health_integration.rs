//! Integration tests for health probes, metrics and global middleware.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{create_export, create_test_app, get_request, parse_response_body};

#[tokio::test]
async fn test_live_probe() {
    let app = create_test_app();
    let response = app.send(get_request("/api/health/live")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_response_body(response).await["status"], "alive");
}

#[tokio::test]
async fn test_ready_probe() {
    let app = create_test_app();
    let response = app.send(get_request("/api/health/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_response_body(response).await["status"], "ready");
}

#[tokio::test]
async fn test_health_reports_storage() {
    let app = create_test_app();
    let response = app.send(get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["storage"]["backend"], "memory");
    assert_eq!(body["storage"]["connected"], true);
    assert!(body["storage"]["latency_ms"].is_u64());
}

#[tokio::test]
async fn test_metrics_endpoint_renders_prometheus() {
    pdf_export_api::middleware::init_metrics().unwrap();
    let app = create_test_app();
    create_export(&app).await;

    let response = app.send(get_request("/metrics")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"), "{}", text);
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = create_test_app();
    let response = app.send(get_request("/api/health/live")).await;

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "no-referrer");
}

#[tokio::test]
async fn test_request_id_echoed() {
    let app = create_test_app();
    let request = Request::builder()
        .uri("/api/health/live")
        .header("x-request-id", "req-abc-123")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.headers()["x-request-id"], "req-abc-123");
}

#[tokio::test]
async fn test_request_id_generated_when_missing() {
    let app = create_test_app();
    let response = app.send(get_request("/api/health/live")).await;

    let request_id = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = create_test_app();
    let response = app.send(get_request("/api/v1/nothing-here")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
