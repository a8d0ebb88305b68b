//! Bootstrap
//!
//! Wires a configured store, the policy registry and the interceptor together,
//! the way a host service does at startup.

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, StoreBackend};
use crate::engine::CacheInterceptor;
use crate::store::{KeyValueStore, MemoryStore};
use crate::tasks::spawn_cleanup_task;

/// Installs the global tracing subscriber.
///
/// Defaults to `cache_aside=info`, can be overridden with `RUST_LOG`. Does
/// nothing if the host already installed a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_aside=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// A running interceptor plus the background work it owns.
#[derive(Debug)]
pub struct CacheRuntime {
    interceptor: CacheInterceptor,
    cleanup: Option<JoinHandle<()>>,
}

impl CacheRuntime {
    /// # Startup Sequence
    /// 1. Compile the policy file, if any
    /// 2. Open the configured store
    /// 3. Start the expiry sweep (in-memory store only)
    /// 4. Build the interceptor
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let registry = Arc::new(config.load_registry()?);
        info!("Policy registry loaded: {} operations", registry.len());

        let mut cleanup = None;
        let store: Arc<dyn KeyValueStore> = match config.store {
            StoreBackend::Memory => {
                let store = MemoryStore::new(config.max_entries);
                cleanup = Some(spawn_cleanup_task(store.clone(), config.cleanup_interval));
                Arc::new(store)
            }
            StoreBackend::Redis => connect_redis(config).await?,
        };
        info!(
            "Cache store initialized: backend={}, store_timeout={}ms, flight_wait={}ms, strict={}",
            store.backend(),
            config.store_timeout_ms,
            config.flight_wait_ms,
            config.strict
        );

        let interceptor = CacheInterceptor::new(store, registry, config.interceptor_settings());
        Ok(Self {
            interceptor,
            cleanup,
        })
    }

    pub fn interceptor(&self) -> &CacheInterceptor {
        &self.interceptor
    }

    /// Stops background tasks. Outstanding interceptor clones keep working.
    pub fn shutdown(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.abort();
            warn!("Expiry sweep aborted");
        }
        info!("Cache runtime shutdown complete");
    }
}

impl Drop for CacheRuntime {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.abort();
        }
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let url = config
        .redis_url
        .as_deref()
        .context("REDIS_URL is required for the redis store")?;
    let store = crate::store::RedisStore::connect(url)
        .await
        .with_context(|| format!("connecting to redis at {}", url))?
        .with_scan_batch(config.scan_batch);
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    anyhow::bail!("the redis store requires building with the `redis` feature")
}
