//! Stream hub: fan-out of snapshot payloads to live subscribers.
//!
//! Each subscriber owns a bounded channel. Publishing only ever uses
//! `try_send`, so a slow or broken subscriber can never stall the coalescer
//! tick that triggered the publish or delivery to anyone else.

use crate::sync::lock;
use crate::tenant::{StreamKey, TenantKey};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// One message pushed to stream subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Complete JSON snapshot of the stream's view
    Snapshot(Arc<str>),
    /// JSON error object; the stream carries no snapshot while it applies
    Error(Arc<str>),
}

impl Payload {
    /// Builds an error payload `{"error": code, "message": message}`.
    #[must_use]
    pub fn error(code: &str, message: &str) -> Self {
        Self::Error(json!({ "error": code, "message": message }).to_string().into())
    }

    /// Transport event name.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Error(_) => "error",
        }
    }

    /// JSON body.
    #[must_use]
    pub fn data(&self) -> &str {
        match self {
            Self::Snapshot(data) | Self::Error(data) => data,
        }
    }
}

type Subscribers = HashMap<Uuid, mpsc::Sender<Payload>>;

struct HubInner {
    buffer: usize,
    streams: Mutex<HashMap<StreamKey, Subscribers>>,
}

impl HubInner {
    fn remove(&self, key: &StreamKey, id: Uuid) -> bool {
        let mut streams = lock(&self.streams);
        let Some(subscribers) = streams.get_mut(key) else {
            return false;
        };
        let removed = subscribers.remove(&id).is_some();
        if subscribers.is_empty() {
            streams.remove(key);
        }
        removed
    }
}

/// Registry of live subscribers per stream key.
#[derive(Clone)]
pub struct StreamHub {
    inner: Arc<HubInner>,
}

impl fmt::Debug for StreamHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHub")
            .field("buffer", &self.inner.buffer)
            .field("streams", &lock(&self.inner.streams).len())
            .finish()
    }
}

impl StreamHub {
    /// Creates a hub giving each subscriber a buffer of `buffer` payloads.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                buffer: buffer.max(1),
                streams: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers a new subscriber. Dropping the subscription unsubscribes it.
    #[must_use]
    pub fn subscribe(&self, key: &StreamKey) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        let id = Uuid::new_v4();
        lock(&self.inner.streams)
            .entry(key.clone())
            .or_default()
            .insert(id, sender);
        debug!("Subscriber {} joined {}", id, key);

        Subscription {
            key: key.clone(),
            id,
            receiver,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscriber. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, key: &StreamKey, id: Uuid) -> bool {
        let removed = self.inner.remove(key, id);
        if removed {
            debug!("Subscriber {} left {}", id, key);
        }
        removed
    }

    /// Delivers a payload to every current subscriber of `key`.
    ///
    /// Returns the number of subscribers that accepted it. Zero subscribers is not an error.
    pub fn publish(&self, key: &StreamKey, payload: &Payload) -> usize {
        let targets: Vec<(Uuid, mpsc::Sender<Payload>)> = match lock(&self.inner.streams).get(key) {
            Some(subscribers) => subscribers
                .iter()
                .map(|(id, sender)| (*id, sender.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, sender) in targets {
            match sender.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} on {} is not keeping up, dropped payload", id, key);
                }
                Err(TrySendError::Closed(_)) => {
                    self.inner.remove(key, id);
                }
            }
        }
        delivered
    }

    /// Delivers a payload to one subscriber only.
    pub fn send(&self, key: &StreamKey, id: Uuid, payload: &Payload) -> bool {
        let sender = lock(&self.inner.streams)
            .get(key)
            .and_then(|subscribers| subscribers.get(&id))
            .cloned();
        let Some(sender) = sender else {
            return false;
        };
        match sender.try_send(payload.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber {} on {} is not keeping up, dropped payload", id, key);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.inner.remove(key, id);
                false
            }
        }
    }

    /// Number of subscribers of `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &StreamKey) -> usize {
        lock(&self.inner.streams).get(key).map_or(0, HashMap::len)
    }

    /// Number of keys with at least one subscriber.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        lock(&self.inner.streams).len()
    }

    /// Disconnects every subscriber of a tenant's streams.
    pub fn remove_tenant(&self, tenant: &TenantKey) -> usize {
        let mut streams = lock(&self.inner.streams);
        let mut removed = 0;
        streams.retain(|key, subscribers| {
            if key.tenant() == tenant {
                removed += subscribers.len();
                false
            } else {
                true
            }
        });
        removed
    }
}

/// A live subscriber connection to one stream.
pub struct Subscription {
    key: StreamKey,
    id: Uuid,
    receiver: mpsc::Receiver<Payload>,
    hub: Weak<HubInner>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key.as_str())
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Stream key.
    #[must_use]
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Subscriber id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the next payload; `None` once the hub disconnected this subscriber.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.receiver.recv().await
    }

    /// Returns a payload if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(&self.key, self.id) {
                debug!("Subscriber {} closed on {}", self.id, self.key);
            }
        }
    }
}
