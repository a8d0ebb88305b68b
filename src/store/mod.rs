//! Cache Store Client
//!
//! Thin contract over a key-value store: get, set with TTL, delete and
//! delete-by-prefix. Every call may fail; the interceptor treats failures as a
//! miss or a no-op.

mod entry;
mod lru;
mod memory;
#[cfg(feature = "redis")]
mod redis;


use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::policy::Ttl;

pub use entry::StoredEntry;
pub use lru::LruTracker;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 512;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 4 * 1024 * 1024; // 4 MB

// == Expiry ==
/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Key does not exist
    Missing,
    /// Key exists without expiry
    Never,
    /// Key expires after the given duration
    In(Duration),
}

// == Key Value Store ==
/// Contract the interceptor needs from a key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored bytes, or None when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores bytes, fully replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()>;

    /// Removes a key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every key starting with `prefix`; returns how many went.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize>;

    /// Lists keys starting with `prefix` (empty prefix lists everything).
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    async fn time_to_live(&self, key: &str) -> Result<Expiry>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
