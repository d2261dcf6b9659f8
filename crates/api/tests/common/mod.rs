//! Common test utilities for integration tests.
//!
//! Routers are built over the in-memory export store with a manual clock and a
//! recording dispatcher, so these tests need no database or network.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::Duration;
use domain::services::{ExportLifecycleService, InMemoryExportStore, MockJobDispatcher};
use pdf_export_api::{
    app::{create_app, AppState},
    config::Config,
};
use shared::clock::ManualClock;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryExportStore>,
    pub clock: Arc<ManualClock>,
    pub dispatcher: MockJobDispatcher,
    pub lifecycle: Arc<ExportLifecycleService>,
    pub config: Config,
}

impl TestApp {
    /// Send one request through the full middleware stack.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Test configuration on top of embedded defaults.
///
/// The job processor runs without a simulated delay.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut all = vec![("dispatcher.simulated_delay_ms", "0")];
    all.extend_from_slice(overrides);
    Config::load_for_test(&all).expect("Failed to load test config")
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config(&[]), MockJobDispatcher::new())
}

pub fn create_test_app_with(config: Config, dispatcher: MockJobDispatcher) -> TestApp {
    let store = Arc::new(InMemoryExportStore::new());
    let clock = Arc::new(ManualClock::default());
    let lifecycle = Arc::new(ExportLifecycleService::new(
        store.clone(),
        clock.clone(),
        Duration::seconds(config.export.expiration_secs),
    ));

    let state = AppState::new(
        config.clone(),
        Arc::clone(&lifecycle),
        Arc::new(dispatcher.clone()),
    );

    TestApp {
        router: create_app(state),
        store,
        clock,
        dispatcher,
        lifecycle,
        config,
    }
}

/// Build a JSON request.
pub fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a bodiless request.
pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    empty_request(Method::GET, uri)
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}

/// Create an export through the API and return its id.
pub async fn create_export(app: &TestApp) -> Uuid {
    let response = app.send(empty_request(Method::POST, "/api/v1/export")).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = parse_response_body(response).await;
    body["id"].as_str().unwrap().parse().unwrap()
}

/// Complete an export directly through the lifecycle service.
pub async fn complete_export(app: &TestApp, id: Uuid) {
    app.lifecycle
        .transition(
            id,
            domain::models::ExportStatus::Completed,
            Some(format!("http://localhost:8080/api/v1/download/{}", id)),
        )
        .await
        .unwrap();
}

/// Location header of a redirect response.
pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Wait for a background job to move an export to `status`.
pub async fn wait_for_status(
    app: &TestApp,
    id: Uuid,
    status: domain::models::ExportStatus,
) -> domain::models::ExportRecord {
    use domain::services::ExportStore;

    for _ in 0..200 {
        if let Some(record) = app.store.find(id).await.unwrap() {
            if record.status == status {
                return record;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("export {} never reached {}", id, status);
}
