//! API integration tests.

use std::time::Duration;

use axum::http::{Method, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{
    body_json, broadcast_app, create_session, empty_request, join, json_request, post_message,
    test_app,
};

/// Read the next SSE frame from a streaming body, with a deadline.
async fn next_frame(body: &mut axum::body::Body) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("timed out waiting for SSE frame")
        .expect("stream ended unexpectedly")
        .expect("stream error");
    let bytes = frame.into_data().expect("not a data frame");
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Parse the JSON payload out of an SSE `data:` frame.
fn frame_json(frame: &str) -> Value {
    let data = frame
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("no data line in frame");
    serde_json::from_str(data).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let response = app
        .oneshot(empty_request(Method::GET, "/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_create_session() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(empty_request(Method::POST, "/api/session"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let code = json["code"].as_str().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
    assert!(json["adminSecret"].is_string());
    assert_eq!(json["expiresInSeconds"], 3600);

    // A fresh session has no participants.
    let response = app
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/participants"),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["participants"], json!({}));
}

#[tokio::test]
async fn test_join_unknown_session() {
    let app = test_app();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/session/000000/join",
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_join_assigns_participant_ids() {
    let app = test_app();
    let (code, _) = create_session(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/session/{code}/join"),
            json!({ "displayName": "Alice" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let alice = json["participantId"].as_str().unwrap().to_string();
    assert_eq!(alice.len(), 8);
    assert_eq!(json["displayName"], "Alice");

    // Without a display name the id doubles as the name.
    let anon = join(&app, &code, None).await;
    assert_ne!(anon, alice);

    let response = app
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/participants"),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["participants"][&alice], "Alice");
    assert_eq!(json["participants"][&anon], anon.as_str());
}

#[tokio::test]
async fn test_directed_message_flow() {
    let app = test_app();
    let (code, _) = create_session(&app).await;
    let alice = join(&app, &code, Some("Alice")).await;
    let bob = join(&app, &code, Some("Bob")).await;

    let response = post_message(&app, &code, &alice, &bob, "hi").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["message"]["from"], alice.as_str());
    assert_eq!(json["message"]["to"], bob.as_str());
    assert_eq!(json["message"]["text"], "hi");

    // The same ordered pair may not speak twice.
    let response = post_message(&app, &code, &alice, &bob, "again").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The reverse direction is independent.
    let response = post_message(&app, &code, &bob, &alice, "hello back").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_post_message_validation() {
    let app = test_app();
    let (code, _) = create_session(&app).await;
    let alice = join(&app, &code, None).await;
    let bob = join(&app, &code, None).await;

    // Unknown session
    let response = post_message(&app, "000000", &alice, &bob, "hi").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Blank text
    let response = post_message(&app, &code, &alice, &bob, "   ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing fields
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/session/{code}/message"),
            json!({ "from": alice, "text": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unregistered participant
    let response = post_message(&app, &code, &alice, "ghost123", "hi").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_message() {
    let app = test_app();
    let (code, secret) = create_session(&app).await;
    let alice = join(&app, &code, None).await;
    let bob = join(&app, &code, None).await;
    let carol = join(&app, &code, None).await;

    post_message(&app, &code, &alice, &bob, "to bob").await;
    post_message(&app, &code, &alice, &carol, "to carol").await;

    // Wrong secret is rejected and leaves the ledger alone.
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/session/{code}/message/0?adminSecret=wrong"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Missing secret
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/session/{code}/message/0"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Out-of-range index
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/session/{code}/message/5?adminSecret={secret}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Correct secret removes exactly the indexed entry...
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/session/{code}/message/0?adminSecret={secret}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["deleted"]["text"], "to bob");

    // ...and later entries shift down by one.
    let response = app
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/session/{code}/message/0?adminSecret={secret}"),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["deleted"]["text"], "to carol");
}

#[tokio::test]
async fn test_end_session() {
    let app = test_app();
    let (code, secret) = create_session(&app).await;
    let bob = join(&app, &code, None).await;

    // Wrong and missing secrets are rejected.
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/session/{code}/end?adminSecret=wrong"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/session/{code}/end"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/session/{code}/end?adminSecret={secret}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "session ended");

    // The session is gone for reads and for new subscribers.
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/participants"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/stream/{bob}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stream_replays_backlog() {
    let app = test_app();
    let (code, _) = create_session(&app).await;
    let alice = join(&app, &code, Some("Alice")).await;
    let bob = join(&app, &code, Some("Bob")).await;

    post_message(&app, &code, &alice, &bob, "hi").await;

    // A subscriber connecting after the post still receives the message.
    let response = app
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/stream/{bob}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let payload = frame_json(&next_frame(&mut body).await);
    assert_eq!(payload["text"], "hi");
    assert!(payload["timestamp"].is_number());
    // The sender's identity is never exposed to the receiver.
    assert!(payload.get("from").is_none());
}

#[tokio::test]
async fn test_stream_delivers_live_events() {
    let app = test_app();
    let (code, _) = create_session(&app).await;
    let alice = join(&app, &code, Some("Alice")).await;
    let bob = join(&app, &code, Some("Bob")).await;

    // Subscribe first, then post.
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/stream/{bob}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    post_message(&app, &code, &alice, &bob, "hi").await;

    let payload = frame_json(&next_frame(&mut body).await);
    assert_eq!(payload["text"], "hi");
    assert!(payload.get("from").is_none());
}

#[tokio::test]
async fn test_stream_validation() {
    let app = test_app();
    let (code, _) = create_session(&app).await;

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            "/api/session/000000/stream/ghost123",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/stream/ghost123"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_broadcast_mode_flow() {
    let app = broadcast_app();
    let (code, _) = create_session(&app).await;
    let alice = join(&app, &code, Some("Alice")).await;

    // Session-wide stream, subscribed before any message.
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/stream"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    // The pair-uniqueness rule does not apply in broadcast mode.
    for text in ["one", "two"] {
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                &format!("/api/session/{code}/message"),
                json!({ "participantId": alice, "text": text }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let payload = frame_json(&next_frame(&mut body).await);
    assert_eq!(payload["message"]["text"], "one");
    assert_eq!(payload["message"]["displayName"], "Alice");

    let payload = frame_json(&next_frame(&mut body).await);
    assert_eq!(payload["message"]["text"], "two");

    // Per-participant streams are a directed-mode surface.
    let response = app
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/session/{code}/stream/{alice}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_broadcast_post_validation() {
    let app = broadcast_app();
    let (code, _) = create_session(&app).await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            &format!("/api/session/{code}/message"),
            json!({ "text": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
