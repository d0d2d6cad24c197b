//! Cache — best-effort TTL cache for entity reads and list snapshots.
//!
//! Keys follow the `"{entity}:{id}"` / `"{entity}:list"` convention. The
//! cache is never authoritative: callers must treat every failure as a miss
//! and never propagate cache errors. Write paths invalidate eagerly rather
//! than waiting for TTL expiry.

mod in_memory;
mod sweep;

use std::time::{Duration, SystemTime};

use serde_json::Value;

pub use in_memory::InMemoryCache;
pub use sweep::{sweep, SweepHandle, SweepStats};

/// Cache key for a single record of an entity.
pub fn record_key(entity: &str, id: &str) -> String {
    format!("{}:{}", entity, id)
}

/// Cache key for an entity's full list snapshot.
pub fn list_key(entity: &str) -> String {
    format!("{}:list", entity)
}

/// One cached value with its absolute expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: SystemTime,
}

/// Abstract cache store.
///
/// Implementations degrade rather than fail: `get` returns `None` on any
/// problem, writes are best-effort. `invalidate_pattern` removes every key
/// containing the given literal substring; a persistent backend that cannot
/// scan keys may no-op it (documented limitation, callers must not rely on
/// pattern invalidation for persisted caches).
pub trait CacheStore: Send + Sync {
    /// Returns the cached value, or `None` on miss or expiry.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, expiring after `ttl`. Overwrites any
    /// existing entry.
    fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Remove a single key. Idempotent.
    fn delete(&self, key: &str);

    /// Remove every key containing `substring` (literal, not a regex).
    fn invalidate_pattern(&self, substring: &str);

    /// Drop expired entries now; returns how many were removed.
    fn purge_expired(&self) -> usize;
}
