//! Integration Tests for degraded stores
//!
//! A broken or slow store must never break the wrapped operation: reads fall
//! back to computing, writes and evictions become no-ops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cache_aside::error::Result as CacheResult;
use cache_aside::{
    CacheError, CacheEvict, CacheInterceptor, Cacheable, CallContext, Expiry, InterceptError,
    InterceptorSettings, KeyValueStore, PolicyRegistry, Ttl,
};
use tokio_test::assert_ok;

// == Test Stores ==

/// Every call fails as if the connection were refused.
struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::Transport("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Ttl) -> CacheResult<()> {
        Err(CacheError::Transport("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        Err(CacheError::Transport("connection refused".to_string()))
    }

    async fn delete_by_prefix(&self, _prefix: &str) -> CacheResult<usize> {
        Err(CacheError::Transport("connection refused".to_string()))
    }

    async fn keys(&self, _prefix: &str) -> CacheResult<Vec<String>> {
        Err(CacheError::Transport("connection refused".to_string()))
    }

    async fn time_to_live(&self, _key: &str) -> CacheResult<Expiry> {
        Err(CacheError::Transport("connection refused".to_string()))
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

/// Every call hangs for longer than the interceptor is willing to wait.
struct SlowStore {
    delay: Duration,
}

impl SlowStore {
    async fn stall(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.stall().await;
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Ttl) -> CacheResult<()> {
        self.stall().await;
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        self.stall().await;
        Ok(false)
    }

    async fn delete_by_prefix(&self, _prefix: &str) -> CacheResult<usize> {
        self.stall().await;
        Ok(0)
    }

    async fn keys(&self, _prefix: &str) -> CacheResult<Vec<String>> {
        self.stall().await;
        Ok(Vec::new())
    }

    async fn time_to_live(&self, _key: &str) -> CacheResult<Expiry> {
        self.stall().await;
        Ok(Expiry::Missing)
    }

    fn backend(&self) -> &'static str {
        "slow"
    }
}

// == Helper Functions ==

fn interceptor(store: Arc<dyn KeyValueStore>) -> CacheInterceptor {
    let registry = PolicyRegistry::builder()
        .cacheable("user.get", Cacheable::new("#userId").prefix("user"))
        .evict("user.update", CacheEvict::key("#userId").prefix("user"))
        .evict("user.import", CacheEvict::all("user"))
        .build()
        .unwrap();
    let settings = InterceptorSettings {
        store_timeout: Duration::from_millis(20),
        ..InterceptorSettings::default()
    };
    CacheInterceptor::new(store, Arc::new(registry), settings)
}

async fn get_user(
    cache: &CacheInterceptor,
    calls: &AtomicUsize,
) -> Result<String, InterceptError<String>> {
    let ctx = CallContext::new("user.get").arg("userId", &1);
    cache
        .cached(&ctx, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("ada".to_string())
        })
        .await
}

// == Failing Store ==

#[tokio::test]
async fn test_failing_store_falls_back_to_compute() {
    let cache = interceptor(Arc::new(FailingStore));
    let calls = &AtomicUsize::new(0);

    assert_eq!(assert_ok!(get_user(&cache, calls).await), "ada");
    assert_eq!(assert_ok!(get_user(&cache, calls).await), "ada");

    // Nothing could be cached, so both calls computed
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let stats = cache.stats();
    assert_eq!(stats.writes, 0);
    assert!(stats.store_failures >= 4, "get and set failed on each call");
}

#[tokio::test]
async fn test_failing_store_eviction_is_a_no_op() {
    let cache = interceptor(Arc::new(FailingStore));

    let ctx = CallContext::new("user.update").arg("userId", &1);
    let saved: Result<u8, InterceptError<String>> =
        cache.write_then_evict(&ctx, || async { Ok(1) }).await;
    assert_eq!(assert_ok!(saved), 1);

    let ctx = CallContext::new("user.import");
    let imported: Result<u8, InterceptError<String>> =
        cache.write_then_evict(&ctx, || async { Ok(2) }).await;
    assert_eq!(assert_ok!(imported), 2);

    assert_eq!(cache.stats().evictions, 0);
}

#[tokio::test]
async fn test_failing_store_admin_reads_empty() {
    let cache = interceptor(Arc::new(FailingStore));

    assert_eq!(cache.namespace_stats().await.total_keys, 0);
    assert_eq!(cache.clear_all().await, 0);
    assert!(!cache.exists("user:1").await);
    assert_eq!(cache.time_to_live("user:1").await, None);
}

// == Slow Store ==

#[tokio::test]
async fn test_slow_store_is_bounded_by_timeout() {
    let cache = interceptor(Arc::new(SlowStore {
        delay: Duration::from_secs(5),
    }));
    let calls = &AtomicUsize::new(0);

    let started = Instant::now();
    assert_eq!(assert_ok!(get_user(&cache, calls).await), "ada");
    let elapsed = started.elapsed();

    // One bounded get, one bounded re-check as leader, one bounded set
    assert!(
        elapsed < Duration::from_secs(1),
        "call took {:?} despite the store timeout",
        elapsed
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.stats().store_failures >= 2);
}
