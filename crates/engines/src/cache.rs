//! Generic TTL cache with injected policy.
//!
//! Replaces what would otherwise be ambient global caches: every cache in
//! the system is an explicit object constructed with a [`CachePolicy`] and
//! passed through the call chain. Eviction is time-based only; racing
//! writers to the same key may both compute and the later write wins, which
//! is acceptable because every cached payload is a pure function of current
//! history.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Capacity and TTL policy for a [`TtlCache`].
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub capacity: usize,
}

impl CachePolicy {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self { ttl, capacity }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: 4096,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Read-mostly TTL cache. `V` is typically an `Arc` so hits are cheap clones.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    policy: CachePolicy,
    map: RwLock<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a live entry. Expired entries read as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let map = self.map.read().unwrap_or_else(|e| e.into_inner());
        map.get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert with a fresh expiry, evicting if over capacity.
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());

        if map.len() >= self.policy.capacity && !map.contains_key(&key) {
            // Expired entries go first; if none, drop the oldest write.
            map.retain(|_, entry| !entry.is_expired(now));
            if map.len() >= self.policy.capacity {
                if let Some(oldest) = map
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(k, _)| k.clone())
                {
                    map.remove(&oldest);
                }
            }
        }

        map.insert(
            key,
            Entry {
                value,
                created_at: now,
                expires_at: now + self.policy.ttl,
            },
        );
    }

    /// Read-through access: on miss or expiry, compute synchronously and
    /// write back. The computation runs outside any lock, so concurrent
    /// missers may compute in parallel; last write wins.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    /// Number of entries currently stored, including expired ones awaiting
    /// eviction.
    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries. Used by tests and explicit refresh paths.
    pub fn clear(&self) {
        self.map.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
