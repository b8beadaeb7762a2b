//! Application state shared across handlers.

use std::sync::Arc;

use crate::session::SessionService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session service for the whole request surface.
    pub sessions: Arc<SessionService>,
    /// CORS origins from configuration; empty means the permissive default.
    pub cors_allowed_origins: Vec<String>,
}

impl AppState {
    /// Create new application state.
    pub fn new(sessions: SessionService, cors_allowed_origins: Vec<String>) -> Self {
        Self {
            sessions: Arc::new(sessions),
            cors_allowed_origins,
        }
    }
}
