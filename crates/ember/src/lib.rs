//! Ember backend library.
//!
//! Ephemeral, code-addressed messaging sessions: a TTL-bound session store,
//! a one-time directed message ledger, and real-time fan-out to SSE
//! subscribers.

pub mod api;
pub mod session;
pub mod sse;
pub mod store;
