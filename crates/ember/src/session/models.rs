//! Session data models.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Delivery semantics for a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One designated sender and receiver per message; each ordered pair may
    /// speak exactly once per session, and the receiver never learns the
    /// sender's identity.
    #[default]
    Directed,
    /// Every message is visible to every participant; the pair-uniqueness
    /// rule does not apply.
    Broadcast,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Directed => write!(f, "directed"),
            SessionMode::Broadcast => write!(f, "broadcast"),
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "directed" => Ok(SessionMode::Directed),
            "broadcast" => Ok(SessionMode::Broadcast),
            _ => Err(format!("unknown session mode: {}", s)),
        }
    }
}

/// A message inside a session.
///
/// `from`/`to` are set in directed mode, `participant_id`/`display_name` in
/// broadcast mode; the wire layout keeps unset fields absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Millisecond-derived id, strictly increasing within a session.
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub text: String,
    /// Creation time in unix milliseconds.
    pub timestamp: i64,
}

/// Persisted session record. Lives in the TTL store under `session:{code}`
/// and dies with it; participants and messages have no existence outside the
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Second random code gating destructive operations, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_secret: Option<String>,
    /// Participant id -> display name.
    #[serde(default)]
    pub participants: HashMap<String, String>,
    /// Append-only except for admin-gated removal.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    /// Fresh session with no participants or messages.
    pub fn new(admin_secret: Option<String>) -> Self {
        Self {
            created_at: Utc::now().to_rfc3339(),
            admin_secret,
            participants: HashMap::new(),
            messages: Vec::new(),
        }
    }

    /// Next message id: the millisecond clock, bumped past the newest id so
    /// two posts within the same millisecond stay distinct and ordered.
    pub fn next_message_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        match self.messages.last() {
            Some(last) => now.max(last.id + 1),
            None => now,
        }
    }

    /// Whether a directed message for the ordered pair already exists.
    pub fn has_directed_pair(&self, from: &str, to: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.from.as_deref() == Some(from) && m.to.as_deref() == Some(to))
    }
}
