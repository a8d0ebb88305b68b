//! Cache Policy Registry
//!
//! Maps operation identifiers to their compiled policies. Built once at startup,
//! read-only afterwards, so lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::declare::{CacheEvict, Cacheable, PolicyTable};
use super::CachePolicy;
use crate::error::{CacheError, Result};

// == Registry ==
/// Compiled policies keyed by operation identifier.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    cacheable: HashMap<String, Arc<CachePolicy>>,
    evictions: HashMap<String, Vec<Arc<CachePolicy>>>,
}

impl PolicyRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Compiles a declarative policy table.
    pub fn from_table(table: &PolicyTable) -> Result<Self> {
        let mut builder = Self::builder();
        for decl in &table.operations {
            if let Some(cacheable) = &decl.cacheable {
                builder = builder.cacheable(&decl.operation, cacheable.clone());
            }
            for evict in &decl.evict {
                builder = builder.evict(&decl.operation, evict.clone());
            }
        }
        builder.build()
    }

    /// Parses and compiles a JSON policy table.
    pub fn from_json(json: &str) -> Result<Self> {
        let table: PolicyTable = serde_json::from_str(json)
            .map_err(|e| CacheError::InvalidPolicy(format!("policy table: {}", e)))?;
        Self::from_table(&table)
    }

    // == Resolve ==
    /// Read-through policy of an operation.
    pub fn resolve(&self, operation: &str) -> Option<Arc<CachePolicy>> {
        self.cacheable.get(operation).cloned()
    }

    /// Eviction policies of an operation, in registration order.
    pub fn evictions(&self, operation: &str) -> &[Arc<CachePolicy>] {
        self.evictions
            .get(operation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.cacheable.contains_key(operation) || self.evictions.contains_key(operation)
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        let evict_only = self
            .evictions
            .keys()
            .filter(|op| !self.cacheable.contains_key(*op))
            .count();
        self.cacheable.len() + evict_only
    }

    pub fn is_empty(&self) -> bool {
        self.cacheable.is_empty() && self.evictions.is_empty()
    }
}

// == Builder ==
/// Collects declarations and compiles them all in [`RegistryBuilder::build`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    cacheable: Vec<(String, Cacheable)>,
    evictions: Vec<(String, CacheEvict)>,
}

impl RegistryBuilder {
    pub fn cacheable(mut self, operation: impl Into<String>, decl: Cacheable) -> Self {
        self.cacheable.push((operation.into(), decl));
        self
    }

    /// Adds an eviction; an operation may carry several.
    pub fn evict(mut self, operation: impl Into<String>, decl: CacheEvict) -> Self {
        self.evictions.push((operation.into(), decl));
        self
    }

    /// Compiles every declaration, failing on the first invalid one.
    pub fn build(self) -> Result<PolicyRegistry> {
        let mut registry = PolicyRegistry::default();

        for (operation, decl) in self.cacheable {
            if registry.cacheable.contains_key(&operation) {
                return Err(CacheError::InvalidPolicy(format!(
                    "operation `{}` registered as cacheable twice",
                    operation
                )));
            }
            let policy = decl.compile(&operation)?;
            debug!(
                "Registered read-through `{}` prefix={} ttl={}",
                operation,
                policy.prefix(),
                policy.ttl()
            );
            registry.cacheable.insert(operation, Arc::new(policy));
        }

        for (operation, decl) in self.evictions {
            let policy = decl.compile(&operation)?;
            debug!(
                "Registered eviction `{}` prefix={} all_entries={}",
                operation,
                policy.prefix(),
                policy.evict_all_entries()
            );
            registry
                .evictions
                .entry(operation)
                .or_default()
                .push(Arc::new(policy));
        }

        info!("Policy registry built with {} operations", registry.len());
        Ok(registry)
    }
}
