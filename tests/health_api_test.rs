mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;

#[tokio::test]
async fn health_pings_the_database() {
    let app = TestApp::new().await;

    let (status, body) = app.send_public(Method::GET, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["database"], "up");
}

#[tokio::test]
async fn status_reports_build_info() {
    let app = TestApp::new().await;

    let (status, body) = app.send_public(Method::GET, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "mbuy-api");
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["data"]["environment"], "test");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let (status, body) = app.send_public(Method::GET, "/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/secure/promotions"].is_object());
}
