//! Cache Aside - read-through caching and eviction for async operations
//!
//! Business operations are registered with a cache policy. Calls then go
//! through a [`CacheInterceptor`], which resolves a key from the call's
//! arguments and either serves the cached result or runs the operation and
//! stores it. Writes evict the keys they invalidate once they succeed.
//!
//! ```ignore
//! let registry = PolicyRegistry::builder()
//!     .cacheable("user.get", Cacheable::new("#userId").prefix("user").timeout(1800))
//!     .evict("user.update", CacheEvict::key("#user.id").prefix("user"))
//!     .build()?;
//! let cache = CacheInterceptor::new(Arc::new(MemoryStore::new(10_000)), Arc::new(registry), Default::default());
//!
//! let ctx = CallContext::new("user.get").arg("userId", &42);
//! let user: User = cache.cached(&ctx, || repo.find(42)).await?;
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod expr;
pub mod policy;
pub mod runtime;
pub mod store;
pub mod tasks;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, StoreBackend};
pub use context::CallContext;
pub use engine::{
    CacheInterceptor, EvictLayer, InterceptorSettings, NamespaceStats, ReadThroughLayer,
    StatsSnapshot,
};
pub use error::{CacheError, InterceptError};
pub use expr::KeyExpression;
pub use policy::{CacheEvict, CachePolicy, Cacheable, PolicyRegistry, PolicyTable, Ttl};
pub use runtime::{init_tracing, CacheRuntime};
pub use store::{Expiry, KeyValueStore, MemoryStore};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use tasks::spawn_cleanup_task;
