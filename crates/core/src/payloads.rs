//! Ephemeral payload store.
//!
//! Holds payloads too large to travel inside a chat interaction (error
//! metadata, detail dumps) and hands out opaque handles that a later
//! interaction can redeem. Entries expire after a fixed TTL; there is no size
//! cap because volume is bounded by human-triggered queries.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_PAYLOAD_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadHandle(String);

impl PayloadHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
pub struct CachedPayload {
    pub id: PayloadHandle,
    pub value: String,
    pub expires_at: Instant,
}

impl CachedPayload {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
pub struct PayloadStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedPayload>>,
}

impl Default for PayloadStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_TTL)
    }
}

impl PayloadStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn save(&self, value: impl Into<String>) -> PayloadHandle {
        let id = PayloadHandle(Uuid::new_v4().to_string());
        let payload =
            CachedPayload { id: id.clone(), value: value.into(), expires_at: Instant::now() + self.ttl };

        self.lock().insert(id.0.clone(), payload);
        id
    }

    /// Returns `None` for unknown and expired handles alike.
    pub fn load(&self, handle: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(handle) {
            Some(payload) if payload.is_live(now) => Some(payload.value.clone()),
            Some(_) => {
                entries.remove(handle);
                None
            }
            None => None,
        }
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, payload| payload.is_live(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|payload| payload.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically drops expired entries. The task ends once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    return;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(event_name = "payloads.sweep", purged, "expired payloads purged");
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedPayload>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
