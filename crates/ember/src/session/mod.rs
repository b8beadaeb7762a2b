//! Ephemeral session management.
//!
//! Sessions live in a TTL store under their code; the repository serializes
//! all mutation per code, and the service layers the participant registry,
//! the one-time message ledger, and lifecycle on top.

mod codes;
mod error;
mod models;
mod repository;
mod service;

pub use error::Error;
pub use models::{Message, Session, SessionMode};
pub use repository::SessionRepository;
pub use service::{
    CreatedSession, Participant, PostMessage, SessionService, SessionServiceConfig,
};
