//! Subscription hub for per-participant event fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::Message;

/// Size of the per-subscriber buffer. Holds the catch-up backlog plus any
/// burst of live events; a consumer that falls further behind loses pushes
/// (the ledger still has the messages).
const SUBSCRIBER_BUFFER_SIZE: usize = 256;

/// Key a subscriber registers under: the session code plus, in directed
/// mode, the receiving participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberKey {
    pub code: String,
    pub participant: Option<String>,
}

impl SubscriberKey {
    /// Key for a directed-mode subscriber: one participant's inbox.
    pub fn directed(code: &str, participant: &str) -> Self {
        Self {
            code: code.to_string(),
            participant: Some(participant.to_string()),
        }
    }

    /// Key for a broadcast-mode subscriber: the whole session.
    pub fn broadcast(code: &str) -> Self {
        Self {
            code: code.to_string(),
            participant: None,
        }
    }
}

impl std::fmt::Display for SubscriberKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.participant {
            Some(participant) => write!(f, "{}/{}", self.code, participant),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Payload delivered to a subscriber channel.
///
/// Directed delivery exposes only the text and timestamp; the sender's
/// identity never reaches the receiver. Broadcast delivery wraps the whole
/// message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Directed { text: String, timestamp: i64 },
    Broadcast { message: Message },
}

impl Payload {
    /// Directed-mode payload for `message`, stripped down to what the
    /// receiver may see.
    pub fn directed(message: &Message) -> Self {
        Payload::Directed {
            text: message.text.clone(),
            timestamp: message.timestamp,
        }
    }

    /// Broadcast-mode payload carrying `message` as-is.
    pub fn broadcast(message: &Message) -> Self {
        Payload::Broadcast {
            message: message.clone(),
        }
    }
}

struct Slot {
    id: u64,
    tx: mpsc::Sender<Payload>,
}

#[derive(Default)]
struct HubInner {
    /// Subscriber key -> live channels (one per open connection).
    subscribers: DashMap<SubscriberKey, Vec<Slot>>,
    next_id: AtomicU64,
}

/// Process-wide registry of live subscriber channels.
///
/// Constructed once at startup and injected through the application state;
/// cheap to clone. The hub only holds lookup keys and channel ends, never
/// session data.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// Create a new hub with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber channel under `key`.
    ///
    /// `backlog` is queued into the channel before the registration becomes
    /// visible to `publish`, so callers that compute the backlog and
    /// subscribe under the session's mutation lock get replay strictly
    /// before live delivery, with nothing lost or duplicated in between.
    pub fn subscribe(&self, key: SubscriberKey, backlog: Vec<Payload>) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        for payload in backlog {
            if tx.try_send(payload).is_err() {
                warn!("replay backlog overflow for {}, dropping the rest", key);
                break;
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Slot { id, tx });
        debug!("registered subscriber {} for {}", id, key);

        Subscription {
            key,
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Deliver `payload` to every channel registered under `key`.
    ///
    /// With no subscribers the payload is dropped; a full channel (stalled
    /// consumer) drops it for that subscriber only.
    pub fn publish(&self, key: &SubscriberKey, payload: Payload) {
        let Some(mut slots) = self.inner.subscribers.get_mut(key) else {
            return;
        };
        slots.retain(|slot| match slot.tx.try_send(payload.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("subscriber {} for {} is stalled, dropping event", slot.id, key);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Drop every registration belonging to `code`. Senders close, so the
    /// serving streams end once their buffers drain.
    pub fn remove_session(&self, code: &str) {
        self.inner.subscribers.retain(|key, _| key.code != code);
    }

    /// Number of live channels under `key`.
    pub fn subscriber_count(&self, key: &SubscriberKey) -> usize {
        self.inner
            .subscribers
            .get(key)
            .map(|slots| slots.len())
            .unwrap_or(0)
    }
}

/// A registered subscriber channel: replayed backlog first, then live
/// events. Deregisters itself from the hub when dropped, so a cancelled
/// connection cannot leak its registration.
pub struct Subscription {
    key: SubscriberKey,
    id: u64,
    rx: mpsc::Receiver<Payload>,
    inner: Arc<HubInner>,
}

impl Subscription {
    /// Wait for the next payload. `None` once every sender is gone — after
    /// session teardown the buffered events still drain first.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let emptied = match self.inner.subscribers.get_mut(&self.key) {
            Some(mut slots) => {
                slots.retain(|slot| slot.id != self.id);
                slots.is_empty()
            }
            None => return,
        };
        if emptied {
            self.inner
                .subscribers
                .remove_if(&self.key, |_, slots| slots.is_empty());
        }
        debug!("deregistered subscriber {} for {}", self.id, self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> Message {
        Message {
            id: 1,
            from: Some("ab12cd34".into()),
            to: Some("zz99xx11".into()),
            participant_id: None,
            display_name: None,
            text: text.into(),
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let hub = EventHub::new();
        let key = SubscriberKey::directed("482913", "zz99xx11");
        let mut sub = hub.subscribe(key.clone(), Vec::new());

        hub.publish(&key, Payload::directed(&message("hi")));

        match sub.recv().await {
            Some(Payload::Directed { text, .. }) => assert_eq!(text, "hi"),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backlog_drains_before_live_events() {
        let hub = EventHub::new();
        let key = SubscriberKey::directed("482913", "zz99xx11");
        let mut sub = hub.subscribe(key.clone(), vec![Payload::directed(&message("old"))]);

        hub.publish(&key, Payload::directed(&message("new")));

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert!(matches!(first, Payload::Directed { text, .. } if text == "old"));
        assert!(matches!(second, Payload::Directed { text, .. } if text == "new"));
    }

    #[tokio::test]
    async fn test_multiple_channels_per_key() {
        let hub = EventHub::new();
        let key = SubscriberKey::directed("482913", "zz99xx11");
        let mut first = hub.subscribe(key.clone(), Vec::new());
        let mut second = hub.subscribe(key.clone(), Vec::new());

        hub.publish(&key, Payload::directed(&message("hi")));

        assert!(first.recv().await.is_some());
        assert!(second.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_drop_deregisters_subscriber() {
        let hub = EventHub::new();
        let key = SubscriberKey::directed("482913", "zz99xx11");
        let sub = hub.subscribe(key.clone(), Vec::new());
        assert_eq!(hub.subscriber_count(&key), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count(&key), 0);
    }

    #[tokio::test]
    async fn test_remove_session_closes_channels_after_drain() {
        let hub = EventHub::new();
        let key = SubscriberKey::directed("482913", "zz99xx11");
        let mut sub = hub.subscribe(key.clone(), Vec::new());

        hub.publish(&key, Payload::directed(&message("hi")));
        hub.remove_session("482913");

        // Buffered event still arrives, then the stream ends.
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let hub = EventHub::new();
        let key = SubscriberKey::broadcast("482913");
        hub.publish(&key, Payload::broadcast(&message("hi")));
        assert_eq!(hub.subscriber_count(&key), 0);
    }

    #[test]
    fn test_directed_payload_omits_sender() {
        let payload = Payload::directed(&message("hi"));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["text"], "hi");
        assert!(value.get("from").is_none());
        assert!(value.get("to").is_none());
    }
}
