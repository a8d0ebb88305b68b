//! In-Memory Store Module
//!
//! Process-local store with TTL expiry and LRU capacity eviction. Used for
//! single-instance deployments and tests; clones share the same data.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Expiry, KeyValueStore, LruTracker, StoredEntry, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::clock::{SharedClock, SystemClock};
use crate::error::{CacheError, Result};
use crate::policy::Ttl;

// == Inner State ==
#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, StoredEntry>,
    lru: LruTracker,
    evictions: u64,
}

impl MemoryInner {
    fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        self.lru.remove(key);
        self.entries.remove(key)
    }

    /// Drops every key matching `pred` in one pass.
    fn remove_where(&mut self, mut pred: impl FnMut(&str, &StoredEntry) -> bool) -> usize {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| pred(key, entry))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }
}

// == Memory Store ==
/// In-memory key-value store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
    clock: SharedClock,
    max_entries: usize,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    /// Creates a store whose expiry follows the given clock.
    pub fn with_clock(max_entries: usize, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryInner::default())),
            clock,
            max_entries: max_entries.max(1),
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries; returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut inner = self.inner.write().await;
        inner.remove_where(|_, entry| entry.is_expired(now))
    }

    /// Current number of entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Entries dropped to stay within capacity.
    pub async fn evictions(&self) -> u64 {
        self.inner.read().await.evictions
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    // == Get ==
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now_ms();
        // Write lock: a hit refreshes LRU order and an expired hit is purged
        let mut inner = self.inner.write().await;

        let expired = match inner.entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            inner.remove(key);
            return Ok(None);
        }

        inner.lru.touch(key);
        Ok(inner.entries.get(key).map(|entry| entry.value.clone()))
    }

    // == Set ==
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::Rejected(format!(
                "key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(CacheError::Rejected(format!(
                "value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }

        let now = self.clock.now_ms();
        let mut inner = self.inner.write().await;

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_entries {
            match inner.lru.evict_oldest() {
                Some(evicted) => {
                    inner.entries.remove(&evicted);
                    inner.evictions += 1;
                    debug!("Memory store at capacity, evicted {}", evicted);
                }
                None => {
                    return Err(CacheError::Rejected(
                        "store is full and eviction failed".to_string(),
                    ))
                }
            }
        }

        inner
            .entries
            .insert(key.to_string(), StoredEntry::new(value, ttl, now));
        inner.lru.touch(key);
        Ok(())
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.write().await;
        Ok(inner
            .remove(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false))
    }

    // == Delete By Prefix ==
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        let mut inner = self.inner.write().await;
        Ok(inner.remove_where(|key, _| key.starts_with(prefix)))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now_ms();
        let inner = self.inner.read().await;
        let mut keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn time_to_live(&self, key: &str) -> Result<Expiry> {
        let now = self.clock.now_ms();
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .get(key)
            .map(|entry| entry.remaining(now))
            .unwrap_or(Expiry::Missing))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::num::NonZeroU64;
    use std::time::Duration;

    fn secs(n: u64) -> Ttl {
        Ttl::Seconds(NonZeroU64::new(n).unwrap())
    }

    fn manual_store(max_entries: usize) -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (MemoryStore::with_clock(max_entries, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_store_set_and_get() {
        let store = MemoryStore::new(100);

        store.set("key1", b"value1".to_vec(), secs(60)).await.unwrap();

        assert_eq!(store.get("key1").await.unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.len().await, 1);
        assert!(store.exists("key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_get_nonexistent() {
        let store = MemoryStore::new(100);
        assert_eq!(store.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_overwrite() {
        let store = MemoryStore::new(100);

        store.set("key1", b"v1".to_vec(), secs(60)).await.unwrap();
        store.set("key1", b"v2".to_vec(), secs(60)).await.unwrap();

        assert_eq!(store.get("key1").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_delete() {
        let store = MemoryStore::new(100);

        store.set("key1", b"v".to_vec(), secs(60)).await.unwrap();
        assert!(store.delete("key1").await.unwrap());
        assert!(!store.delete("key1").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_ttl_expiration() {
        let (store, clock) = manual_store(100);

        store.set("key1", b"v".to_vec(), secs(1)).await.unwrap();
        assert!(store.get("key1").await.unwrap().is_some());

        clock.advance(Duration::from_millis(1_000));
        assert_eq!(store.get("key1").await.unwrap(), None);
        // Expired read purges the entry
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_never_expires() {
        let (store, clock) = manual_store(100);

        store.set("key1", b"v".to_vec(), Ttl::Never).await.unwrap();
        clock.advance(Duration::from_secs(365 * 24 * 3600));

        assert!(store.get("key1").await.unwrap().is_some());
        assert_eq!(store.time_to_live("key1").await.unwrap(), Expiry::Never);
    }

    #[tokio::test]
    async fn test_store_lru_eviction() {
        let store = MemoryStore::new(3);

        for key in ["key1", "key2", "key3"] {
            store.set(key, b"v".to_vec(), secs(60)).await.unwrap();
        }
        // Touch key1 so key2 becomes the oldest
        store.get("key1").await.unwrap();
        store.set("key4", b"v".to_vec(), secs(60)).await.unwrap();

        assert_eq!(store.len().await, 3);
        assert!(store.get("key1").await.unwrap().is_some());
        assert!(store.get("key2").await.unwrap().is_none());
        assert_eq!(store.evictions().await, 1);
    }

    #[tokio::test]
    async fn test_store_delete_by_prefix() {
        let store = MemoryStore::new(100);

        for key in ["user:1", "user:42", "users:9", "course:7"] {
            store.set(key, b"v".to_vec(), secs(60)).await.unwrap();
        }

        assert_eq!(store.delete_by_prefix("user:").await.unwrap(), 2);
        assert_eq!(
            store.keys("").await.unwrap(),
            vec!["course:7".to_string(), "users:9".to_string()]
        );
    }

    #[tokio::test]
    async fn test_store_time_to_live() {
        let (store, clock) = manual_store(100);

        store.set("key1", b"v".to_vec(), secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(15));

        assert_eq!(
            store.time_to_live("key1").await.unwrap(),
            Expiry::In(Duration::from_secs(45))
        );
        assert_eq!(store.time_to_live("other").await.unwrap(), Expiry::Missing);
    }

    #[tokio::test]
    async fn test_store_cleanup_expired() {
        let (store, clock) = manual_store(100);

        store.set("short", b"v".to_vec(), secs(1)).await.unwrap();
        store.set("long", b"v".to_vec(), secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_key_too_long() {
        let store = MemoryStore::new(100);
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);

        let result = store.set(&long_key, b"v".to_vec(), secs(60)).await;
        assert!(matches!(result, Err(CacheError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_store_value_too_large() {
        let store = MemoryStore::new(100);
        let large = vec![0u8; MAX_VALUE_SIZE + 1];

        let result = store.set("key", large, secs(60)).await;
        assert!(matches!(result, Err(CacheError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = MemoryStore::new(10);
        let other = store.clone();

        store.set("k", b"v".to_vec(), secs(60)).await.unwrap();
        assert!(other.get("k").await.unwrap().is_some());
        assert_eq!(store.backend(), "memory");
    }
}
