//! Test utilities and common setup.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use ember::api::{self, AppState};
use ember::session::{SessionMode, SessionRepository, SessionService, SessionServiceConfig};
use ember::sse::EventHub;
use ember::store::MemoryStore;

pub const TEST_TTL: Duration = Duration::from_secs(3600);

/// Create a test application over a fresh in-memory store.
pub fn test_app() -> Router {
    test_app_with_config(SessionServiceConfig::default())
}

/// Create a broadcast-mode test application.
pub fn broadcast_app() -> Router {
    test_app_with_config(SessionServiceConfig {
        mode: SessionMode::Broadcast,
        ..Default::default()
    })
}

/// Create a test application with the given service configuration.
pub fn test_app_with_config(config: SessionServiceConfig) -> Router {
    let store = Arc::new(MemoryStore::new());
    let repo = SessionRepository::new(store, TEST_TTL, 6);
    let sessions = SessionService::new(repo, EventHub::new(), config);
    let state = AppState::new(sessions, Vec::new());
    api::create_router(state)
}

/// Build a JSON request.
pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Build a bodyless request.
pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .body(Body::empty())
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Create a session and return its code and admin secret.
pub async fn create_session(app: &Router) -> (String, String) {
    let response = app
        .clone()
        .oneshot(empty_request(Method::POST, "/api/session"))
        .await
        .unwrap();
    let json = body_json(response).await;
    (
        json["code"].as_str().unwrap().to_string(),
        json["adminSecret"].as_str().unwrap_or_default().to_string(),
    )
}

/// Join a session and return the assigned participant id.
pub async fn join(app: &Router, code: &str, display_name: Option<&str>) -> String {
    let body = match display_name {
        Some(name) => json!({ "displayName": name }),
        None => json!({}),
    };
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/session/{code}/join"),
            body,
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    json["participantId"].as_str().unwrap().to_string()
}

/// Post a directed message; returns the raw response.
pub async fn post_message(
    app: &Router,
    code: &str,
    from: &str,
    to: &str,
    text: &str,
) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/session/{code}/message"),
            json!({ "from": from, "to": to, "text": text }),
        ))
        .await
        .unwrap()
}
