//! Keyed TTL memoization for slow store lookups.

use std::{
    future::Future,
    hash::Hash,
    time::{Duration, Instant},
};

use ahash::AHashMap;
use parking_lot::Mutex;

/// A memoizing wrapper around a slow lookup, with per-entry expiry.
///
/// The lock is released while a loader runs, so two tasks missing the same
/// key may both hit the backing store; the second insert simply refreshes
/// the entry. Loader failures propagate unchanged and are never cached.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<AHashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(AHashMap::new()),
        }
    }

    /// Returns the cached value if it has not expired.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().insert(key, (value, Instant::now()));
    }

    /// Returns the cached value, or runs `loader` and caches its success.
    pub async fn get_or_load<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = loader().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Drops expired entries; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (_, stored_at)| stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
