//! Redis Store Module
//!
//! Store client for a shared Redis instance, enabled with the `redis` feature.
//! Prefix deletes walk the keyspace with `SCAN` and remove each batch with
//! `UNLINK`, so no call ever enumerates the whole keyspace at once.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

use super::{Expiry, KeyValueStore};
use crate::error::{CacheError, Result};
use crate::policy::Ttl;

/// Keys requested per `SCAN` round trip by default
pub const DEFAULT_SCAN_BATCH: usize = 500;

// == Redis Store ==
/// Redis-backed store sharing one multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    scan_batch: usize,
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            scan_batch: DEFAULT_SCAN_BATCH,
        })
    }

    /// Sets the `COUNT` hint used while scanning for prefix deletes.
    pub fn with_scan_batch(mut self, scan_batch: usize) -> Self {
        self.scan_batch = scan_batch.max(1);
        self
    }

    /// Visits every key matching `prefix*`, one `SCAN` page at a time.
    async fn scan_prefix<F>(&self, prefix: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(Vec<String>) -> Option<Vec<String>>,
    {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch)
                .query_async(&mut conn)
                .await?;

            if let Some(batch) = visit(page) {
                if !batch.is_empty() {
                    let _: i64 = redis::cmd("UNLINK")
                        .arg(&batch)
                        .query_async(&mut conn)
                        .await?;
                }
            }

            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("scan_batch", &self.scan_batch)
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl.as_secs() {
            Some(secs) => {
                let _: () = conn.set_ex(key, value, secs).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0usize;
        self.scan_prefix(prefix, |page| {
            removed += page.len();
            Some(page)
        })
        .await?;
        debug!("Redis prefix delete `{}` removed {} keys", prefix, removed);
        Ok(removed)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.scan_prefix(prefix, |page| {
            keys.extend(page);
            None
        })
        .await?;
        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn time_to_live(&self, key: &str) -> Result<Expiry> {
        let mut conn = self.conn.clone();
        let pttl: i64 = conn.pttl(key).await?;
        match pttl {
            -2 => Ok(Expiry::Missing),
            -1 => Ok(Expiry::Never),
            ms if ms >= 0 => Ok(Expiry::In(Duration::from_millis(ms as u64))),
            other => Err(CacheError::Transport(format!(
                "unexpected PTTL reply {} for {}",
                other, key
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Escapes Redis glob metacharacters so a prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^' | '-') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("user:"), "user:");
        assert_eq!(escape_glob("a*b?c"), "a\\*b\\?c");
        assert_eq!(escape_glob("[x]"), "\\[x\\]");
    }
}
