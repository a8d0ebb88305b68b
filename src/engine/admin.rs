//! Maintenance operations over the keys the interceptor writes.
//!
//! Every call here is best-effort: an unreachable store reads as empty.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use super::CacheInterceptor;
use crate::policy::KEY_SEPARATOR;
use crate::store::Expiry;

/// Bucket for keys without a namespace separator
pub const UNGROUPED: &str = "other";

/// Key counts grouped by namespace (the segment before the first `:`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    pub total_keys: usize,
    pub by_namespace: BTreeMap<String, usize>,
}

fn namespace_of(key: &str) -> &str {
    key.split_once(KEY_SEPARATOR)
        .map(|(namespace, _)| namespace)
        .unwrap_or(UNGROUPED)
}

impl CacheInterceptor {
    pub async fn namespace_stats(&self) -> NamespaceStats {
        let keys = self.inner.gateway.keys("").await.unwrap_or_default();

        let mut by_namespace = BTreeMap::new();
        for key in &keys {
            *by_namespace.entry(namespace_of(key).to_string()).or_insert(0) += 1;
        }
        NamespaceStats {
            total_keys: keys.len(),
            by_namespace,
        }
    }

    /// Removes every key under `namespace:`. Returns the number removed.
    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        let prefix = format!("{}{}", namespace, KEY_SEPARATOR);
        let removed = self
            .inner
            .gateway
            .delete_by_prefix(&prefix)
            .await
            .unwrap_or(0);
        info!("Cache cleared namespace {}: {} keys", namespace, removed);
        removed
    }

    /// Removes every key in the store.
    pub async fn clear_all(&self) -> usize {
        let removed = self.inner.gateway.delete_by_prefix("").await.unwrap_or(0);
        info!("Cache cleared: {} keys", removed);
        removed
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.inner.gateway.exists(key).await.unwrap_or(false)
    }

    /// Remaining lifetime of `key`; None when the store could not be asked.
    pub async fn time_to_live(&self, key: &str) -> Option<Expiry> {
        self.inner.gateway.time_to_live(key).await
    }
}
