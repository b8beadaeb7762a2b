//! Session persistence over the TTL store.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::codes;
use super::error::Error;
use super::models::Session;
use crate::store::{SessionStore, StoreError};

/// Attempts at generating a non-colliding code before giving up.
const MAX_CODE_ATTEMPTS: usize = 100;

/// Repository owning the read-modify-write protocol against the TTL store.
///
/// Mutations on the same code are serialized through a per-code mutex, so a
/// load-transform-persist sequence cannot lose a concurrent update. Every
/// write path resets the expiry window to the full TTL; reads never touch it,
/// which is how active sessions stay alive under use.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn SessionStore>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    ttl: Duration,
    code_length: usize,
}

impl SessionRepository {
    /// Create a new repository.
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration, code_length: usize) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
            ttl,
            code_length,
        }
    }

    /// The configured session lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(code: &str) -> String {
        format!("session:{}", code)
    }

    /// Acquire the mutation lock for `code`.
    ///
    /// The service also holds this lock across subscribe-replay and
    /// post-publish sequences so backlog replay is fully serialized with live
    /// delivery.
    pub async fn lock(&self, code: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(code.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    /// Persist a fresh session under a newly generated code.
    ///
    /// Regenerates on collision with a live session; never overwrites one.
    pub async fn create(&self, session: &Session) -> Result<String, Error> {
        let raw = serde_json::to_string(session)?;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = codes::session_code(self.code_length);
            if self
                .store
                .put_if_absent(&Self::key(&code), &raw, self.ttl)
                .await?
            {
                debug!("created session {}", code);
                return Ok(code);
            }
            warn!("session code collision, regenerating");
        }
        Err(Error::Store(StoreError::Backend(
            "session code space exhausted".to_string(),
        )))
    }

    /// Load a session without renewing its TTL.
    pub async fn get(&self, code: &str) -> Result<Session, Error> {
        let raw = self
            .store
            .get(&Self::key(code))
            .await?
            .ok_or(Error::SessionNotFound)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist `session` with the TTL reset to the full window.
    ///
    /// Callers must hold the code's lock.
    pub async fn persist(&self, code: &str, session: &Session) -> Result<(), Error> {
        let raw = serde_json::to_string(session)?;
        self.store.put(&Self::key(code), &raw, self.ttl).await?;
        Ok(())
    }

    /// Serialized read-modify-write: load, apply `f`, persist with the TTL
    /// reset. Fails with `SessionNotFound` when the code is absent or
    /// expired.
    pub async fn mutate<T>(
        &self,
        code: &str,
        f: impl FnOnce(&mut Session) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let _guard = self.lock(code).await;
        let mut session = self.get(code).await?;
        let out = f(&mut session)?;
        self.persist(code, &session).await?;
        Ok(out)
    }

    /// Remove the session and its lock entry.
    pub async fn delete(&self, code: &str) -> Result<(), Error> {
        self.store.delete(&Self::key(code)).await?;
        self.locks.remove(code);
        Ok(())
    }
}
