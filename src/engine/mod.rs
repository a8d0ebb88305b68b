//! Interception Engine
//!
//! Wraps business operations with read-through caching and post-write eviction.
//!
//! # Read path
//! 1. Resolve `prefix:key` from the call's arguments
//! 2. Serve a decodable, unexpired entry without running the operation
//! 3. Otherwise join the in-flight computation for the key, or lead it
//! 4. The leader runs the operation, writes the encoded result with the policy
//!    TTL and hands the same bytes to its followers
//!
//! Store failures and corrupt entries degrade to a miss. Configuration errors
//! bypass the cache, or fail the call when the interceptor runs strict.

mod admin;
mod flight;
mod gateway;
mod layer;
mod stats;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::codec;
use crate::context::CallContext;
use crate::error::{CacheError, InterceptError, Result};
use crate::policy::{CachePolicy, PolicyRegistry};
use crate::store::KeyValueStore;

use flight::{FlightLeader, Outcome, Role, SingleFlight};
use gateway::StoreGateway;

pub use admin::NamespaceStats;
pub use layer::{EvictLayer, EvictService, ReadThroughLayer, ReadThroughService};
pub use stats::{InterceptorStats, StatsSnapshot};

// == Settings ==
/// Tunables of the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorSettings {
    /// Upper bound for every store call
    pub store_timeout: Duration,
    /// How long a caller waits for another caller's computation of the same key
    /// before computing on its own
    pub flight_wait: Duration,
    /// Fail calls on configuration errors instead of bypassing the cache
    pub strict: bool,
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(250),
            flight_wait: Duration::from_secs(5),
            strict: false,
        }
    }
}

struct Inner {
    gateway: StoreGateway,
    registry: Arc<PolicyRegistry>,
    clock: SharedClock,
    settings: InterceptorSettings,
    flights: SingleFlight,
    stats: Arc<InterceptorStats>,
}

// == Cache Interceptor ==
/// Handle through which business operations are cached and evicted.
///
/// Cheap to clone; clones share the store handle, registry, single-flight table
/// and statistics.
#[derive(Clone)]
pub struct CacheInterceptor {
    inner: Arc<Inner>,
}

impl CacheInterceptor {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        registry: Arc<PolicyRegistry>,
        settings: InterceptorSettings,
    ) -> Self {
        Self::with_clock(store, registry, settings, Arc::new(SystemClock))
    }

    /// Creates an interceptor whose entry timestamps come from `clock`.
    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        registry: Arc<PolicyRegistry>,
        settings: InterceptorSettings,
        clock: SharedClock,
    ) -> Self {
        let stats = Arc::new(InterceptorStats::new());
        let gateway = StoreGateway::new(store, settings.store_timeout, Arc::clone(&stats));
        Self {
            inner: Arc::new(Inner {
                gateway,
                registry,
                clock,
                settings,
                flights: SingleFlight::new(),
                stats,
            }),
        }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.inner.registry
    }

    pub fn settings(&self) -> &InterceptorSettings {
        &self.inner.settings
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Keys currently being computed by a leader in this process.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.in_flight()
    }

    pub fn resolve_key(&self, policy: &CachePolicy, ctx: &CallContext) -> Result<String> {
        policy.resolve_key(ctx)
    }

    // == Read Through ==
    /// Serves `compute`'s result from the cache, computing and storing it on a
    /// miss.
    ///
    /// `compute` is never called on a hit. Its error is returned unchanged as
    /// [`InterceptError::Operation`] and nothing is cached for it.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        policy: &CachePolicy,
        ctx: &CallContext,
        compute: F,
    ) -> std::result::Result<T, InterceptError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = match policy.resolve_key(ctx) {
            Ok(key) => key,
            Err(err) => {
                self.configuration_error(policy.operation(), err)
                    .map_err(InterceptError::Cache)?;
                return self.bypass(compute).await;
            }
        };

        if let Some(value) = self.lookup::<T>(&key).await {
            return Ok(value);
        }

        let deadline = Instant::now() + self.inner.settings.flight_wait;
        loop {
            match self.inner.flights.join_or_lead(&key) {
                Role::Leader(leader) => {
                    // A previous leader may have finished between our miss and now
                    if let Some(bytes) = self.inner.gateway.get(&key).await {
                        if let Some(value) = self.decode_fresh::<T>(&key, &bytes) {
                            self.inner.stats.record_coalesced();
                            leader.complete(Some(Arc::from(bytes)));
                            return Ok(value);
                        }
                    }
                    return self.compute_and_store(policy, &key, compute, Some(leader)).await;
                }
                Role::Follower(follower) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match follower.wait(remaining).await {
                        Outcome::Shared(bytes) => {
                            if let Some(value) = self.decode_fresh::<T>(&key, &bytes) {
                                self.inner.stats.record_coalesced();
                                debug!("Cache coalesced: {}", key);
                                return Ok(value);
                            }
                            return self.compute_and_store(policy, &key, compute, None).await;
                        }
                        Outcome::Abandoned if Instant::now() < deadline => continue,
                        Outcome::Abandoned | Outcome::TimedOut => {
                            debug!("Cache flight wait exceeded for {}, computing", key);
                            return self.compute_and_store(policy, &key, compute, None).await;
                        }
                    }
                }
            }
        }
    }

    /// Read-through for the policy registered under `ctx.operation()`.
    pub async fn cached<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        compute: F,
    ) -> std::result::Result<T, InterceptError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match self.inner.registry.resolve(ctx.operation()) {
            Some(policy) => self.read_through(&policy, ctx, compute).await,
            None => {
                let err = CacheError::UnknownOperation(ctx.operation().to_string());
                self.configuration_error(ctx.operation(), err)
                    .map_err(InterceptError::Cache)?;
                self.bypass(compute).await
            }
        }
    }

    // == Evict ==
    /// Evicts the key a call resolves to, or the policy's whole namespace.
    ///
    /// Call only after the write this eviction accompanies has succeeded; use
    /// [`CacheInterceptor::write_then_evict`] to get that ordering for free.
    /// A missing key is not an error and store failures are logged only.
    pub async fn evict(&self, policy: &CachePolicy, ctx: &CallContext) -> Result<()> {
        if policy.evict_all_entries() {
            let namespace = policy.namespace();
            if let Some(removed) = self.inner.gateway.delete_by_prefix(&namespace).await {
                self.inner.stats.record_eviction();
                info!("Cache evict all under {}: {} keys removed", namespace, removed);
            }
            return Ok(());
        }

        let key = match policy.resolve_key(ctx) {
            Ok(key) => key,
            Err(err) => return self.configuration_error(policy.operation(), err),
        };
        if let Some(existed) = self.inner.gateway.delete(&key).await {
            self.inner.stats.record_eviction();
            debug!("Cache evict: {} (present: {})", key, existed);
        }
        Ok(())
    }

    /// Runs `write`, then applies every eviction registered for the operation.
    ///
    /// Nothing is evicted when `write` fails, so a cached value is only dropped
    /// once the system of record holds the change.
    pub async fn write_then_evict<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        write: F,
    ) -> std::result::Result<T, InterceptError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let registry = &self.inner.registry;
        if !registry.contains(ctx.operation()) {
            let err = CacheError::UnknownOperation(ctx.operation().to_string());
            self.configuration_error(ctx.operation(), err)
                .map_err(InterceptError::Cache)?;
        }

        let value = write().await.map_err(InterceptError::Operation)?;

        for policy in registry.evictions(ctx.operation()) {
            self.evict(policy, ctx).await.map_err(InterceptError::Cache)?;
        }
        Ok(value)
    }

    // == Internals ==
    /// Strict mode surfaces the error; otherwise the call bypasses the cache.
    fn configuration_error(&self, operation: &str, err: CacheError) -> Result<()> {
        if self.inner.settings.strict {
            error!("Cache configuration error in `{}`: {}", operation, err);
            return Err(err);
        }
        self.inner.stats.record_bypass();
        warn!("Cache bypassed for `{}`: {}", operation, err);
        Ok(())
    }

    async fn bypass<T, E, F, Fut>(&self, compute: F) -> std::result::Result<T, InterceptError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.inner.stats.record_compute();
        compute().await.map_err(InterceptError::Operation)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.inner.gateway.get(key).await {
            Some(bytes) => self.decode_fresh::<T>(key, &bytes),
            None => None,
        };

        match value {
            Some(value) => {
                self.inner.stats.record_hit();
                debug!("Cache hit: {}", key);
                Some(value)
            }
            None => {
                self.inner.stats.record_miss();
                debug!("Cache miss: {}", key);
                None
            }
        }
    }

    /// Decodes an entry; corrupt or expired entries read as absent.
    fn decode_fresh<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Option<T> {
        match codec::decode::<T>(bytes) {
            Ok(decoded) if decoded.is_expired(self.inner.clock.now_ms()) => {
                debug!("Cache entry past its TTL: {}", key);
                None
            }
            Ok(decoded) => Some(decoded.value),
            Err(err) => {
                self.inner.stats.record_decode_failure();
                warn!("Cache entry for {} unreadable, treating as miss: {}", key, err);
                None
            }
        }
    }

    async fn compute_and_store<T, E, F, Fut>(
        &self,
        policy: &CachePolicy,
        key: &str,
        compute: F,
        leader: Option<FlightLeader<'_>>,
    ) -> std::result::Result<T, InterceptError<E>>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.inner.stats.record_compute();
        // On failure the leader is dropped, which releases followers empty-handed
        let value = compute().await.map_err(InterceptError::Operation)?;

        let written_at = self.inner.clock.now_ms();
        let payload = match codec::encode(&value, written_at, policy.ttl()) {
            Ok(encoded) => {
                let shared: Option<Arc<[u8]>> =
                    leader.as_ref().map(|_| Arc::from(&encoded.bytes[..]));

                if encoded.is_null && !policy.cache_null() {
                    self.inner.stats.record_null_skip();
                    debug!("Cache skip null result: {}", key);
                } else if self.inner.gateway.set(key, encoded.bytes, policy.ttl()).await {
                    self.inner.stats.record_write();
                    debug!("Cache put: {} ttl={}", key, policy.ttl());
                }
                shared
            }
            Err(err) => {
                warn!("Cache encode failed for {}: {}", key, err);
                None
            }
        };

        if let Some(leader) = leader {
            leader.complete(payload);
        }
        Ok(value)
    }
}

impl std::fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInterceptor")
            .field("backend", &self.inner.gateway.backend())
            .field("operations", &self.inner.registry.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}
