use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// A concurrent TTL map used for the token → AuthInfo memo.
///
/// Entries expire `ttl` after insertion and are lazily evicted on access;
/// the invalidation loop clears the whole map on its own cadence.
pub struct TtlCache<K, V> {
    inner: DashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            inner: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.inner.get(key) {
            let (value, inserted) = entry.value();
            if inserted.elapsed() < self.ttl {
                return Some(value.clone());
            }
            // Expired; release the read guard before removing.
            drop(entry);
            self.inner.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, (value, Instant::now()));
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Live entry count (expired entries not yet evicted included).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
