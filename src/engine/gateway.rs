//! Best-effort store access
//!
//! Wraps the store client so that every call is bounded by a timeout and every
//! failure turns into a miss or a no-op, logged and counted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::stats::InterceptorStats;
use crate::error::{CacheError, Result};
use crate::policy::Ttl;
use crate::store::{Expiry, KeyValueStore};

pub(crate) struct StoreGateway {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
    stats: Arc<InterceptorStats>,
}

impl StoreGateway {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        timeout: Duration,
        stats: Arc<InterceptorStats>,
    ) -> Self {
        Self {
            store,
            timeout,
            stats,
        }
    }

    pub(crate) fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Runs one store call under the timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                operation,
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn degrade<T>(&self, operation: &str, target: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.stats.record_store_failure();
                warn!(
                    backend = self.store.backend(),
                    "Store {} failed for {}: {}", operation, target, err
                );
                None
            }
        }
    }

    /// Failures read as a miss.
    pub(crate) async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result = self.bounded("get", self.store.get(key)).await;
        self.degrade("get", key, result).flatten()
    }

    /// Returns whether the write landed.
    pub(crate) async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> bool {
        let result = self.bounded("set", self.store.set(key, value, ttl)).await;
        self.degrade("set", key, result).is_some()
    }

    pub(crate) async fn delete(&self, key: &str) -> Option<bool> {
        let result = self.bounded("delete", self.store.delete(key)).await;
        self.degrade("delete", key, result)
    }

    pub(crate) async fn delete_by_prefix(&self, prefix: &str) -> Option<usize> {
        let result = self
            .bounded("delete_by_prefix", self.store.delete_by_prefix(prefix))
            .await;
        self.degrade("delete_by_prefix", prefix, result)
    }

    pub(crate) async fn keys(&self, prefix: &str) -> Option<Vec<String>> {
        let result = self.bounded("keys", self.store.keys(prefix)).await;
        self.degrade("keys", prefix, result)
    }

    pub(crate) async fn exists(&self, key: &str) -> Option<bool> {
        let result = self.bounded("exists", self.store.exists(key)).await;
        self.degrade("exists", key, result)
    }

    pub(crate) async fn time_to_live(&self, key: &str) -> Option<Expiry> {
        let result = self.bounded("time_to_live", self.store.time_to_live(key)).await;
        self.degrade("time_to_live", key, result)
    }
}
