//! HTTP API module.
//!
//! REST endpoints for session lifecycle and messaging, plus the SSE
//! streaming surface.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
