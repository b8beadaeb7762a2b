//! Domain errors for session operations.

use thiserror::Error;

use crate::store::StoreError;

/// Failure taxonomy for session operations. Every variant is terminal for
/// the request; the API layer maps variants to status codes.
#[derive(Debug, Error)]
pub enum Error {
    /// Absent and expired sessions are observably identical.
    #[error("session not found or expired")]
    SessionNotFound,

    /// Missing or blank required fields, out-of-range indices.
    #[error("{0}")]
    InvalidInput(String),

    /// A referenced participant id is not registered in the session.
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    /// The ordered sender/recipient pair has already been used.
    #[error("a message for this sender/recipient pair already exists")]
    DuplicateMessage,

    /// The operation requires an admin secret and none was supplied.
    #[error("admin secret required")]
    MissingAdminSecret,

    /// The supplied admin secret does not match the stored one.
    #[error("invalid admin secret")]
    Forbidden,

    /// Backing store failure; surfaced as an infrastructure error, never
    /// conflated with `SessionNotFound`.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A persisted record failed to round-trip through serde.
    #[error("malformed session record: {0}")]
    Codec(#[from] serde_json::Error),
}
