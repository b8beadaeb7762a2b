//! In-process TTL store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use super::{SessionStore, StoreError};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    deadline: Instant,
}

impl Slot {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            deadline: Instant::now() + ttl,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// In-memory store with per-key expiry.
///
/// Expired entries are removed lazily on access; `sweep` reclaims the rest
/// and is driven by a periodic task in the server.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns the number reclaimed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.expired());
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("swept {} expired entr(y/ies)", removed);
        }
        removed
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        {
            let Some(slot) = self.entries.get(key) else {
                return Ok(None);
            };
            if !slot.expired() {
                return Ok(Some(slot.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, slot| slot.expired());
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), Slot::new(value, ttl));
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().expired() => {
                occupied.insert(Slot::new(value, ttl));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
