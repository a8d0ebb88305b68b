//! Interceptor Statistics Module
//!
//! Counters for hits, misses and the degraded paths of the interceptor.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Interceptor Stats ==
/// Lock-free counters shared by every call through one interceptor.
#[derive(Debug, Default)]
pub struct InterceptorStats {
    hits: AtomicU64,
    misses: AtomicU64,
    computes: AtomicU64,
    coalesced: AtomicU64,
    writes: AtomicU64,
    null_skips: AtomicU64,
    decode_failures: AtomicU64,
    store_failures: AtomicU64,
    bypasses: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of [`InterceptorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Calls served from the store
    pub hits: u64,
    /// Calls that found nothing usable in the store
    pub misses: u64,
    /// Invocations of the wrapped operation
    pub computes: u64,
    /// Calls served by another caller's in-flight computation
    pub coalesced: u64,
    /// Successful store writes
    pub writes: u64,
    /// Null results not written
    pub null_skips: u64,
    /// Entries that failed to decode
    pub decode_failures: u64,
    /// Store calls that failed or timed out
    pub store_failures: u64,
    /// Calls that skipped the cache because of configuration errors
    pub bypasses: u64,
    /// Eviction requests carried out
    pub evictions: u64,
}

macro_rules! recorders {
    ($($method:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $method(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl InterceptorStats {
    pub fn new() -> Self {
        Self::default()
    }

    recorders! {
        record_hit => hits,
        record_miss => misses,
        record_compute => computes,
        record_coalesced => coalesced,
        record_write => writes,
        record_null_skip => null_skips,
        record_decode_failure => decode_failures,
        record_store_failure => store_failures,
        record_bypass => bypasses,
        record_eviction => evictions,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            null_skips: self.null_skips.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups happened.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let snapshot = InterceptorStats::new().snapshot();
        assert_eq!(snapshot, StatsSnapshot::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(StatsSnapshot::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let stats = InterceptorStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_counters_are_independent() {
        let stats = InterceptorStats::new();
        stats.record_compute();
        stats.record_coalesced();
        stats.record_coalesced();
        stats.record_store_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.computes, 1);
        assert_eq!(snapshot.coalesced, 2);
        assert_eq!(snapshot.store_failures, 1);
        assert_eq!(snapshot.hits, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = InterceptorStats::new();
        stats.record_eviction();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["evictions"], 1);
    }
}
