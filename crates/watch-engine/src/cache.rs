//! In-memory key/value cache with per-entry expiry.
//!
//! Entries are replaced whole, readers never see a half-written value, and
//! an expired entry behaves exactly like an absent one. Read-through
//! computations run outside the lock so a slow discovery round never blocks
//! readers of other keys.

use crate::sync::lock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// TTL cache keyed by string.
pub struct TtlCache<V: Clone> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &lock(&self.entries).len())
            .finish()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the value if present and unexpired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores a value, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        lock(&self.entries).insert(key.into(), entry);
    }

    /// Removes an entry. Returns true if one was present.
    pub fn invalidate(&self, key: &str) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    /// Removes several entries, returning how many existed.
    pub fn remove_many<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut entries = lock(&self.entries);
        keys.into_iter()
            .filter(|key| entries.remove(*key).is_some())
            .count()
    }

    /// Returns the cached value or computes, stores and returns a fresh one.
    ///
    /// Failed computations are returned to the caller and never cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Drops the entry and recomputes it.
    pub async fn invalidate_and_recompute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.invalidate(key);
        self.get_or_compute(key, ttl, compute).await
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}
