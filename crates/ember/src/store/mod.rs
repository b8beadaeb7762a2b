//! TTL-keyed value store backing session state.
//!
//! Session durability is an opaque string-keyed store with per-key expiry.
//! The repository never relies on anything beyond get / put-with-expiry /
//! delete, so the backing medium can be swapped without touching session
//! logic.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;

/// Store-level failure, distinct from "key absent".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Opaque TTL-keyed store for serialized session records.
///
/// An expired key is indistinguishable from one that was never written.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the value for `key`. Does not touch the expiry window.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace `key`, resetting its expiry to `ttl` from now.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Insert `key` only if it is not currently live. Returns `false` when
    /// the key already exists.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove `key` if present.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
