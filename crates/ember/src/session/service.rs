//! Session operations: participant registry, message ledger, lifecycle.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use super::codes;
use super::error::Error;
use super::models::{Message, Session, SessionMode};
use super::repository::SessionRepository;
use crate::sse::{EventHub, Payload, SubscriberKey, Subscription};

/// Service configuration.
#[derive(Debug, Clone)]
pub struct SessionServiceConfig {
    /// Delivery semantics for every session served by this process.
    pub mode: SessionMode,
    /// Whether new sessions get an admin secret gating destructive
    /// operations.
    pub require_admin_secret: bool,
    /// Whether subscribers receive already-stored messages on connect.
    pub replay_backlog: bool,
}

impl Default for SessionServiceConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Directed,
            require_admin_secret: true,
            replay_backlog: true,
        }
    }
}

/// A newly created session, as reported to its creator. The admin secret is
/// visible here and never again.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub code: String,
    pub admin_secret: Option<String>,
    pub expires_in_seconds: u64,
}

/// A joined participant.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
}

/// Fields accepted when posting a message. Which ones are required depends
/// on the mode: `from`/`to` in directed mode, `participant_id` in broadcast
/// mode.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessage {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Service for session lifecycle, participants, and messages.
///
/// Owns the repository and the event hub; every mutation goes through the
/// repository's per-code serialization, and `post`/`subscribe` extend that
/// critical section over hub delivery so replay and live events cannot
/// interleave.
#[derive(Clone)]
pub struct SessionService {
    repo: SessionRepository,
    hub: EventHub,
    config: SessionServiceConfig,
}

impl SessionService {
    /// Create a new service.
    pub fn new(repo: SessionRepository, hub: EventHub, config: SessionServiceConfig) -> Self {
        Self { repo, hub, config }
    }

    /// Create a new session with a fresh code.
    #[instrument(skip(self))]
    pub async fn create(&self) -> Result<CreatedSession, Error> {
        let admin_secret = self.config.require_admin_secret.then(codes::admin_secret);
        let code = self.repo.create(&Session::new(admin_secret.clone())).await?;
        info!("session {} created", code);
        Ok(CreatedSession {
            code,
            admin_secret,
            expires_in_seconds: self.repo.ttl().as_secs(),
        })
    }

    /// Join a session, assigning a participant id unique within it.
    #[instrument(skip(self, display_name))]
    pub async fn join(&self, code: &str, display_name: Option<String>) -> Result<Participant, Error> {
        let display_name = display_name.filter(|name| !name.trim().is_empty());
        self.repo
            .mutate(code, move |session| {
                let id = unique_participant_id(session);
                let name = display_name.unwrap_or_else(|| id.clone());
                session.participants.insert(id.clone(), name.clone());
                Ok(Participant {
                    id,
                    display_name: name,
                })
            })
            .await
    }

    /// Participant id -> display name for a session.
    pub async fn participants(&self, code: &str) -> Result<HashMap<String, String>, Error> {
        Ok(self.repo.get(code).await?.participants)
    }

    /// Post a message and deliver it to any live subscribers.
    ///
    /// The code lock is held across persist and publish, so a subscriber
    /// replaying its backlog concurrently sees this message exactly once.
    #[instrument(skip(self, request))]
    pub async fn post(&self, code: &str, request: PostMessage) -> Result<Message, Error> {
        let text = request
            .text
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();

        let _guard = self.repo.lock(code).await;
        let mut session = self.repo.get(code).await?;

        let (message, key) = match self.config.mode {
            SessionMode::Directed => {
                let from = request.from.unwrap_or_default();
                let to = request.to.unwrap_or_default();
                if from.is_empty() || to.is_empty() || text.is_empty() {
                    return Err(Error::InvalidInput("missing from, to, or text".to_string()));
                }
                if !session.participants.contains_key(&from) {
                    return Err(Error::UnknownParticipant(from));
                }
                if !session.participants.contains_key(&to) {
                    return Err(Error::UnknownParticipant(to));
                }
                // Each ordered pair may speak exactly once per session.
                if session.has_directed_pair(&from, &to) {
                    return Err(Error::DuplicateMessage);
                }
                let message = Message {
                    id: session.next_message_id(),
                    from: Some(from),
                    to: Some(to.clone()),
                    participant_id: None,
                    display_name: None,
                    text,
                    timestamp: Utc::now().timestamp_millis(),
                };
                (message, SubscriberKey::directed(code, &to))
            }
            SessionMode::Broadcast => {
                let participant_id = request.participant_id.unwrap_or_default();
                if participant_id.is_empty() || text.is_empty() {
                    return Err(Error::InvalidInput(
                        "missing participantId or text".to_string(),
                    ));
                }
                let display_name = session
                    .participants
                    .get(&participant_id)
                    .cloned()
                    .ok_or_else(|| Error::UnknownParticipant(participant_id.clone()))?;
                let message = Message {
                    id: session.next_message_id(),
                    from: None,
                    to: None,
                    participant_id: Some(participant_id),
                    display_name: Some(display_name),
                    text,
                    timestamp: Utc::now().timestamp_millis(),
                };
                (message, SubscriberKey::broadcast(code))
            }
        };

        session.messages.push(message.clone());
        self.repo.persist(code, &session).await?;

        let payload = match self.config.mode {
            SessionMode::Directed => Payload::directed(&message),
            SessionMode::Broadcast => Payload::broadcast(&message),
        };
        self.hub.publish(&key, payload);

        Ok(message)
    }

    /// Remove the message at `index`, gated on the session's admin secret.
    #[instrument(skip(self, admin_secret))]
    pub async fn delete_message(
        &self,
        code: &str,
        index: usize,
        admin_secret: Option<&str>,
    ) -> Result<Message, Error> {
        let admin_secret = admin_secret.map(str::to_owned);
        self.repo
            .mutate(code, move |session| {
                match &session.admin_secret {
                    Some(stored) => match admin_secret.as_deref() {
                        None => return Err(Error::MissingAdminSecret),
                        Some(provided) if provided != stored => return Err(Error::Forbidden),
                        Some(_) => {}
                    },
                    None => {
                        return Err(Error::InvalidInput(
                            "session has no admin secret".to_string(),
                        ));
                    }
                }
                if index >= session.messages.len() {
                    return Err(Error::InvalidInput(format!(
                        "message index {} out of range",
                        index
                    )));
                }
                Ok(session.messages.remove(index))
            })
            .await
    }

    /// End a session early: delete the record and tear down every live
    /// subscriber registration for its code.
    #[instrument(skip(self, admin_secret))]
    pub async fn end(&self, code: &str, admin_secret: Option<&str>) -> Result<(), Error> {
        let _guard = self.repo.lock(code).await;
        let session = self.repo.get(code).await?;

        // Sessions created without a secret can be ended by anyone who
        // knows the code.
        if let Some(stored) = &session.admin_secret {
            match admin_secret {
                None => return Err(Error::MissingAdminSecret),
                Some(provided) if provided != stored => return Err(Error::Forbidden),
                Some(_) => {}
            }
        }

        self.repo.delete(code).await?;
        self.hub.remove_session(code);
        info!("session {} ended", code);
        Ok(())
    }

    /// Register a subscriber channel, replaying the catch-up backlog.
    ///
    /// Runs under the code lock: a message posted concurrently lands either
    /// in the replayed backlog or in live delivery, never both and never
    /// neither.
    pub async fn subscribe(
        &self,
        code: &str,
        participant: Option<&str>,
    ) -> Result<Subscription, Error> {
        let _guard = self.repo.lock(code).await;
        let session = self.repo.get(code).await?;

        match self.config.mode {
            SessionMode::Directed => {
                let participant = participant.ok_or_else(|| {
                    Error::InvalidInput("streams are per-participant in directed mode".to_string())
                })?;
                if !session.participants.contains_key(participant) {
                    return Err(Error::UnknownParticipant(participant.to_string()));
                }
                let backlog = if self.config.replay_backlog {
                    session
                        .messages
                        .iter()
                        .filter(|m| m.to.as_deref() == Some(participant))
                        .map(Payload::directed)
                        .collect()
                } else {
                    Vec::new()
                };
                Ok(self
                    .hub
                    .subscribe(SubscriberKey::directed(code, participant), backlog))
            }
            SessionMode::Broadcast => {
                if participant.is_some() {
                    return Err(Error::InvalidInput(
                        "per-participant streams are not available in broadcast mode".to_string(),
                    ));
                }
                let backlog = if self.config.replay_backlog {
                    session.messages.iter().map(Payload::broadcast).collect()
                } else {
                    Vec::new()
                };
                Ok(self.hub.subscribe(SubscriberKey::broadcast(code), backlog))
            }
        }
    }
}

/// Generate a participant id not yet present in the session. Collisions in
/// the 36^8 space are regenerated rather than silently merging identities.
fn unique_participant_id(session: &Session) -> String {
    loop {
        let id = codes::participant_id();
        if !session.participants.contains_key(&id) {
            return id;
        }
    }
}
