//! API request handlers.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::session::{Message, PostMessage};
use crate::sse::Subscription;

use super::error::ApiResult;
use super::state::AppState;

/// SSE keep-alive interval.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Response from session creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_secret: Option<String>,
    pub expires_in_seconds: u64,
}

/// Create a new ephemeral session.
pub async fn create_session(
    State(state): State<AppState>,
) -> ApiResult<Json<CreateSessionResponse>> {
    let created = state.sessions.create().await?;
    Ok(Json(CreateSessionResponse {
        code: created.code,
        admin_secret: created.admin_secret,
        expires_in_seconds: created.expires_in_seconds,
    }))
}

/// Request to join a session.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Response from joining a session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub participant_id: String,
    pub display_name: String,
}

/// Join an existing session.
pub async fn join_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<JoinRequest>,
) -> ApiResult<Json<JoinResponse>> {
    let participant = state.sessions.join(&code, request.display_name).await?;
    Ok(Json(JoinResponse {
        participant_id: participant.id,
        display_name: participant.display_name,
    }))
}

/// Participant listing.
#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub participants: HashMap<String, String>,
}

/// List a session's participants (id -> display name).
pub async fn list_participants(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<ParticipantsResponse>> {
    let participants = state.sessions.participants(&code).await?;
    Ok(Json(ParticipantsResponse { participants }))
}

/// Response from posting a message.
#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub status: String,
    pub message: Message,
}

/// Post a message into a session and deliver it to live subscribers.
pub async fn post_message(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<PostMessage>,
) -> ApiResult<Json<PostMessageResponse>> {
    let message = state.sessions.post(&code, request).await?;
    Ok(Json(PostMessageResponse {
        status: "ok".to_string(),
        message,
    }))
}

/// Admin secret carried in the query string of destructive operations.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSecretQuery {
    #[serde(default)]
    pub admin_secret: Option<String>,
}

/// Response from deleting a message.
#[derive(Debug, Serialize)]
pub struct DeleteMessageResponse {
    pub deleted: Message,
}

/// Delete the message at an index, gated on the admin secret.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((code, index)): Path<(String, usize)>,
    Query(query): Query<AdminSecretQuery>,
) -> ApiResult<Json<DeleteMessageResponse>> {
    let deleted = state
        .sessions
        .delete_message(&code, index, query.admin_secret.as_deref())
        .await?;
    Ok(Json(DeleteMessageResponse { deleted }))
}

/// Response from ending a session.
#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub status: String,
}

/// End a session early, tearing down its subscriber streams.
pub async fn end_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<AdminSecretQuery>,
) -> ApiResult<Json<EndSessionResponse>> {
    state
        .sessions
        .end(&code, query.admin_secret.as_deref())
        .await?;
    Ok(Json(EndSessionResponse {
        status: "session ended".to_string(),
    }))
}

/// Serve a subscription as an SSE response.
///
/// The stream suspends on the channel and ends when it closes (session
/// teardown) or the connection is dropped, which deregisters the
/// subscription.
fn event_stream(subscription: Subscription) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::unfold(subscription, |mut sub| async move {
        let payload = sub.recv().await?;
        let event = Event::default().json_data(&payload).ok()?;
        Some((Ok::<_, Infallible>(event), sub))
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keepalive"),
    )
}

/// Per-participant event stream (directed mode).
pub async fn stream_participant(
    State(state): State<AppState>,
    Path((code, participant_id)): Path<(String, String)>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = state
        .sessions
        .subscribe(&code, Some(&participant_id))
        .await?;
    Ok(event_stream(subscription))
}

/// Session-wide event stream (broadcast mode).
pub async fn stream_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = state.sessions.subscribe(&code, None).await?;
    Ok(event_stream(subscription))
}
