//! Real-time fan-out to event-stream subscribers.
//!
//! The hub is a process-local registry of live subscriber channels keyed by
//! session code and, in directed mode, the receiving participant. Posting a
//! message publishes through it; an SSE connection holds a [`Subscription`]
//! for its whole lifetime and deregisters on drop.

mod hub;

pub use hub::{EventHub, Payload, SubscriberKey, Subscription};
