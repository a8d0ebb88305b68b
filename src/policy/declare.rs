//! Declarative policy shapes
//!
//! The read-through and evict declarations a service registers at startup,
//! either in code or from a JSON policy table.

use serde::{Deserialize, Serialize};

use super::{CachePolicy, Ttl, DEFAULT_TIMEOUT_SECS};
use crate::error::Result;
use crate::expr::KeyExpression;

fn default_timeout() -> i64 {
    DEFAULT_TIMEOUT_SECS
}

// == Cacheable ==
/// Read-through declaration.
///
/// - `key`: key expression (required)
/// - `timeout`: seconds, default 3600, `-1` never expires
/// - `prefix`: key namespace, empty means the operation id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cacheable {
    pub key: String,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub cache_null: bool,
}

impl Cacheable {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            timeout: DEFAULT_TIMEOUT_SECS,
            prefix: String::new(),
            cache_null: false,
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn timeout(mut self, seconds: i64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn cache_null(mut self, cache_null: bool) -> Self {
        self.cache_null = cache_null;
        self
    }

    pub(crate) fn compile(&self, operation: &str) -> Result<CachePolicy> {
        let key = KeyExpression::parse(&self.key)?;
        let ttl = Ttl::from_timeout(self.timeout)?;
        Ok(CachePolicy::read_through(operation, key, self.prefix.clone(), ttl)
            .with_cache_null(self.cache_null))
    }
}

// == Cache Evict ==
/// Eviction declaration.
///
/// - `key`: key expression, may be empty when `allEntries` is set
/// - `prefix`: key namespace, empty means the operation id
/// - `allEntries`: drop every key under the prefix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEvict {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub all_entries: bool,
}

impl CacheEvict {
    /// Evicts the single key the expression resolves to.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Evicts everything under `prefix`.
    pub fn all(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            all_entries: true,
            ..Self::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub(crate) fn compile(&self, operation: &str) -> Result<CachePolicy> {
        let key = if self.key.trim().is_empty() {
            None
        } else {
            Some(KeyExpression::parse(&self.key)?)
        };
        CachePolicy::evict(operation, key, self.prefix.clone(), self.all_entries)
    }
}

// == Policy Table ==
/// Declarations for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDecl {
    pub operation: String,
    #[serde(default)]
    pub cacheable: Option<Cacheable>,
    #[serde(default)]
    pub evict: Vec<CacheEvict>,
}

/// A whole service's declarations, as loaded from configuration.
///
/// ```json
/// {
///   "operations": [
///     { "operation": "UserService::get_user",
///       "cacheable": { "key": "#userId", "prefix": "user", "timeout": 1800 } },
///     { "operation": "UserService::update_user",
///       "evict": [ { "prefix": "user", "allEntries": true } ] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    #[serde(default)]
    pub operations: Vec<OperationDecl>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cacheable_defaults() {
        let decl: Cacheable = serde_json::from_str(r##"{"key": "#userId"}"##).unwrap();
        assert_eq!(decl.timeout, 3600);
        assert_eq!(decl.prefix, "");
        assert!(!decl.cache_null);
        assert_eq!(decl, Cacheable::new("#userId"));
    }

    #[test]
    fn test_evict_defaults() {
        let decl: CacheEvict = serde_json::from_str(r#"{"prefix": "user"}"#).unwrap();
        assert!(!decl.all_entries);
        assert_eq!(decl.key, "");

        let decl: CacheEvict =
            serde_json::from_str(r#"{"prefix": "user", "allEntries": true}"#).unwrap();
        assert_eq!(decl, CacheEvict::all("user"));
    }

    #[test]
    fn test_compile_cacheable() {
        let policy = Cacheable::new("#userId")
            .prefix("user")
            .timeout(60)
            .compile("UserService::get_user")
            .unwrap();

        assert_eq!(policy.prefix(), "user");
        assert_eq!(policy.ttl().as_secs(), Some(60));
        assert!(!policy.evict_all_entries());
    }

    #[test]
    fn test_compile_rejects_bad_declarations() {
        assert!(Cacheable::new("#").compile("op").unwrap_err().is_configuration());
        assert!(Cacheable::new("#id").timeout(0).compile("op").is_err());
        assert!(CacheEvict::default().prefix("user").compile("op").is_err());
        assert!(CacheEvict::key("'open").compile("op").is_err());
    }

    #[test]
    fn test_compile_evict_all_without_key() {
        let policy = CacheEvict::all("user").compile("op").unwrap();
        assert!(policy.evict_all_entries());
        assert!(policy.key().is_none());
    }

    #[test]
    fn test_table_parses() {
        let table: PolicyTable = serde_json::from_str(
            r##"{"operations": [
                {"operation": "get", "cacheable": {"key": "#id", "prefix": "user", "timeout": -1}},
                {"operation": "update", "evict": [{"key": "#id", "prefix": "user"}, {"prefix": "list", "allEntries": true}]}
            ]}"##,
        )
        .unwrap();

        assert_eq!(table.operations.len(), 2);
        assert_eq!(table.operations[0].cacheable.as_ref().unwrap().timeout, -1);
        assert_eq!(table.operations[1].evict.len(), 2);
        assert!(table.operations[1].cacheable.is_none());
    }
}
