//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    // Tracing layer with request timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/session", post(handlers::create_session))
        .route("/api/session/{code}/join", post(handlers::join_session))
        .route(
            "/api/session/{code}/participants",
            get(handlers::list_participants),
        )
        .route("/api/session/{code}/message", post(handlers::post_message))
        .route(
            "/api/session/{code}/message/{index}",
            delete(handlers::delete_message),
        )
        .route("/api/session/{code}/stream", get(handlers::stream_session))
        .route(
            "/api/session/{code}/stream/{participant_id}",
            get(handlers::stream_participant),
        )
        .route("/api/session/{code}/end", post(handlers::end_session))
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
}

/// Build the CORS layer based on configuration.
///
/// With no configured origins the layer is permissive; the service carries
/// no credentials or cookies, so an open policy only exposes what the
/// session code already gates.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN];

    if state.cors_allowed_origins.is_empty() {
        tracing::warn!("CORS: no origins configured, allowing any origin");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = state
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if origins.is_empty() {
        tracing::error!("CORS: all configured origins are invalid!");
        CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")))
    } else {
        tracing::info!("CORS: allowing {} origin(s)", origins.len());
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
    }
}
