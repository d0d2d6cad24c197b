//! InMemoryCache - HashMap-backed TTL cache with a FIFO size bound.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;

use super::{CacheEntry, CacheStore};
use crate::clock::{Clock, SystemClock};

const DEFAULT_MAX_ENTRIES: usize = 1000;

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order, oldest first. Eviction is FIFO, not LRU.
    insertion_order: VecDeque<String>,
}

/// In-memory cache backed by a HashMap.
///
/// Expiry is enforced lazily on `get` and proactively by
/// [`super::sweep`]. When the entry count would exceed the bound, the
/// oldest-inserted entry is evicted. Clone-friendly via Arc.
#[derive(Clone)]
pub struct InMemoryCache {
    inner: Arc<RwLock<CacheInner>>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    /// Create a cache with the default size bound and the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            })),
            clock,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Override the maximum entry count.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Number of live entries, expired or not.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for InMemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let inner = self.inner.read().ok()?;
        let entry = inner.entries.get(key)?;
        if entry.expires_at <= now {
            // Expired entries are never served; the sweeper reclaims them.
            return None;
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        let Ok(mut inner) = self.inner.write() else {
            log::warn!("cache set skipped, lock poisoned (key {})", key);
            return;
        };

        let replaced = inner
            .entries
            .insert(key.to_string(), CacheEntry { value, expires_at })
            .is_some();
        if replaced {
            inner.insertion_order.retain(|k| k != key);
        }
        inner.insertion_order.push_back(key.to_string());

        while inner.entries.len() > self.max_entries {
            match inner.insertion_order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn delete(&self, key: &str) {
        let Ok(mut inner) = self.inner.write() else {
            log::warn!("cache delete skipped, lock poisoned (key {})", key);
            return;
        };
        if inner.entries.remove(key).is_some() {
            inner.insertion_order.retain(|k| k != key);
        }
    }

    fn invalidate_pattern(&self, substring: &str) {
        let Ok(mut inner) = self.inner.write() else {
            log::warn!("cache invalidation skipped, lock poisoned ({})", substring);
            return;
        };
        inner.entries.retain(|key, _| !key.contains(substring));
        inner.insertion_order.retain(|key| !key.contains(substring));
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let Ok(mut inner) = self.inner.write() else {
            return 0;
        };
        let inner = &mut *inner;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.expires_at > now);
        let entries = &inner.entries;
        inner.insertion_order.retain(|key| entries.contains_key(key));
        before - inner.entries.len()
    }
}
