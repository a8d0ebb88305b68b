//! Cache Policy Module
//!
//! Immutable per-operation cache configuration and the registry that holds it.

mod declare;
mod registry;

use std::fmt;
use std::num::NonZeroU64;
use std::time::Duration;

use crate::context::CallContext;
use crate::error::{CacheError, Result};
use crate::expr::KeyExpression;

pub use declare::{CacheEvict, Cacheable, OperationDecl, PolicyTable};
pub use registry::{PolicyRegistry, RegistryBuilder};

// == Public Constants ==
/// Declarative timeout meaning "never expires"
pub const NEVER_EXPIRE: i64 = -1;

/// Default read-through timeout in seconds (one hour)
pub const DEFAULT_TIMEOUT_SECS: i64 = 3600;

/// Separator between a key's prefix and its evaluated fragment
pub const KEY_SEPARATOR: char = ':';

// == TTL ==
/// How long a cached entry stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Seconds(NonZeroU64),
    Never,
}

impl Ttl {
    /// Converts a declarative timeout.
    ///
    /// Positive values are seconds, [`NEVER_EXPIRE`] disables expiry, anything
    /// else is rejected.
    pub fn from_timeout(timeout: i64) -> Result<Self> {
        if timeout == NEVER_EXPIRE {
            return Ok(Ttl::Never);
        }
        u64::try_from(timeout)
            .ok()
            .and_then(NonZeroU64::new)
            .map(Ttl::Seconds)
            .ok_or_else(|| {
                CacheError::InvalidPolicy(format!(
                    "timeout must be positive or {} (never expires), got {}",
                    NEVER_EXPIRE, timeout
                ))
            })
    }

    pub fn as_secs(&self) -> Option<u64> {
        match self {
            Ttl::Seconds(secs) => Some(secs.get()),
            Ttl::Never => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        self.as_secs().map(Duration::from_secs)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Seconds(secs) => write!(f, "{}s", secs),
            Ttl::Never => f.write_str("never"),
        }
    }
}

// == Cache Policy ==
/// Cache configuration attached to one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    operation: String,
    key: Option<KeyExpression>,
    prefix: String,
    ttl: Ttl,
    evict_all_entries: bool,
    cache_null: bool,
}

impl CachePolicy {
    /// Read-through policy. An empty prefix falls back to the operation id.
    pub fn read_through(
        operation: impl Into<String>,
        key: KeyExpression,
        prefix: impl Into<String>,
        ttl: Ttl,
    ) -> Self {
        let operation = operation.into();
        Self {
            prefix: effective_prefix(prefix.into(), &operation),
            operation,
            key: Some(key),
            ttl,
            evict_all_entries: false,
            cache_null: false,
        }
    }

    /// Evict policy. Single-key eviction needs a key expression.
    pub fn evict(
        operation: impl Into<String>,
        key: Option<KeyExpression>,
        prefix: impl Into<String>,
        all_entries: bool,
    ) -> Result<Self> {
        let operation = operation.into();
        if !all_entries && key.is_none() {
            return Err(CacheError::InvalidPolicy(format!(
                "eviction for `{}` needs a key expression unless allEntries is set",
                operation
            )));
        }
        Ok(Self {
            prefix: effective_prefix(prefix.into(), &operation),
            operation,
            key,
            ttl: Ttl::Never,
            evict_all_entries: all_entries,
            cache_null: false,
        })
    }

    /// Also write results that encode to JSON `null`.
    pub fn with_cache_null(mut self, cache_null: bool) -> Self {
        self.cache_null = cache_null;
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn key(&self) -> Option<&KeyExpression> {
        self.key.as_ref()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn evict_all_entries(&self) -> bool {
        self.evict_all_entries
    }

    pub fn cache_null(&self) -> bool {
        self.cache_null
    }

    /// Prefix every key under this policy starts with, separator included.
    pub fn namespace(&self) -> String {
        format!("{}{}", self.prefix, KEY_SEPARATOR)
    }

    // == Resolve Key ==
    /// Builds `prefix:evaluated-key` for a call.
    pub fn resolve_key(&self, ctx: &CallContext) -> Result<String> {
        let key = self.key.as_ref().ok_or_else(|| {
            CacheError::InvalidPolicy(format!(
                "policy for `{}` has no key expression",
                self.operation
            ))
        })?;
        let fragment = key.evaluate(ctx)?;
        Ok(format!("{}{}{}", self.prefix, KEY_SEPARATOR, fragment))
    }
}

fn effective_prefix(prefix: String, operation: &str) -> String {
    if prefix.is_empty() {
        operation.to_string()
    } else {
        prefix
    }
}
