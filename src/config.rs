//! Configuration Module
//!
//! Loads interceptor and store settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::engine::InterceptorSettings;
use crate::policy::PolicyRegistry;

/// Which store client backs the interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown store backend `{}`", other)),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,
    /// Connection URL for the Redis backend
    pub redis_url: Option<String>,
    /// Capacity of the in-memory store
    pub max_entries: usize,
    /// Expiry sweep interval in seconds (in-memory store only)
    pub cleanup_interval: u64,
    pub store_timeout_ms: u64,
    pub flight_wait_ms: u64,
    /// Fail calls on configuration errors instead of bypassing the cache
    pub strict: bool,
    /// `SCAN` page size for Redis prefix deletes
    pub scan_batch: usize,
    /// JSON policy table loaded at startup
    pub policy_file: Option<PathBuf>,
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    ///
    /// # Environment Variables
    /// - `CACHE_STORE` - `memory` or `redis` (default: memory)
    /// - `REDIS_URL` - Redis connection URL
    /// - `CACHE_MAX_ENTRIES` - In-memory capacity (default: 10000)
    /// - `CACHE_CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 1)
    /// - `CACHE_STORE_TIMEOUT_MS` - Per store call bound (default: 250)
    /// - `CACHE_FLIGHT_WAIT_MS` - Single-flight wait bound (default: 5000)
    /// - `CACHE_STRICT` - `true` to fail on configuration errors (default: false)
    /// - `CACHE_SCAN_BATCH` - Redis `SCAN` count hint (default: 500)
    /// - `CACHE_POLICY_FILE` - Path of a JSON policy table
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store: parsed("CACHE_STORE").unwrap_or(defaults.store),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            max_entries: parsed("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            cleanup_interval: parsed("CACHE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
            store_timeout_ms: parsed("CACHE_STORE_TIMEOUT_MS")
                .unwrap_or(defaults.store_timeout_ms),
            flight_wait_ms: parsed("CACHE_FLIGHT_WAIT_MS").unwrap_or(defaults.flight_wait_ms),
            strict: parsed("CACHE_STRICT").unwrap_or(defaults.strict),
            scan_batch: parsed("CACHE_SCAN_BATCH").unwrap_or(defaults.scan_batch),
            policy_file: env::var_os("CACHE_POLICY_FILE").map(PathBuf::from),
        }
    }

    pub fn interceptor_settings(&self) -> InterceptorSettings {
        InterceptorSettings {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            flight_wait: Duration::from_millis(self.flight_wait_ms),
            strict: self.strict,
        }
    }

    /// Compiles the policy file, or an empty registry when none is configured.
    pub fn load_registry(&self) -> anyhow::Result<PolicyRegistry> {
        let Some(path) = &self.policy_file else {
            return Ok(PolicyRegistry::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))?;
        PolicyRegistry::from_json(&json)
            .with_context(|| format!("compiling policy file {}", path.display()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            redis_url: None,
            max_entries: 10_000,
            cleanup_interval: 1,
            store_timeout_ms: 250,
            flight_wait_ms: 5_000,
            strict: false,
            scan_batch: 500,
            policy_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.cleanup_interval, 1);
        assert!(!config.strict);
        assert!(config.policy_file.is_none());
    }

    #[test]
    fn test_config_from_env() {
        // One test touches the environment so parallel tests cannot race on it
        for name in [
            "CACHE_STORE",
            "REDIS_URL",
            "CACHE_MAX_ENTRIES",
            "CACHE_CLEANUP_INTERVAL",
            "CACHE_STORE_TIMEOUT_MS",
            "CACHE_FLIGHT_WAIT_MS",
            "CACHE_STRICT",
            "CACHE_SCAN_BATCH",
            "CACHE_POLICY_FILE",
        ] {
            env::remove_var(name);
        }
        let config = Config::from_env();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.store_timeout_ms, 250);
        assert_eq!(config.flight_wait_ms, 5_000);
        assert_eq!(config.scan_batch, 500);

        env::set_var("CACHE_STORE", "Redis");
        env::set_var("CACHE_STRICT", "true");
        env::set_var("CACHE_FLIGHT_WAIT_MS", "not-a-number");
        let config = Config::from_env();
        assert_eq!(config.store, StoreBackend::Redis);
        assert!(config.strict);
        assert_eq!(config.flight_wait_ms, 5_000);

        env::remove_var("CACHE_STORE");
        env::remove_var("CACHE_STRICT");
        env::remove_var("CACHE_FLIGHT_WAIT_MS");
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!(" REDIS ".parse::<StoreBackend>(), Ok(StoreBackend::Redis));
        assert!("memcached".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_interceptor_settings() {
        let config = Config {
            store_timeout_ms: 100,
            flight_wait_ms: 2_000,
            strict: true,
            ..Config::default()
        };
        let settings = config.interceptor_settings();
        assert_eq!(settings.store_timeout, Duration::from_millis(100));
        assert_eq!(settings.flight_wait, Duration::from_secs(2));
        assert!(settings.strict);
    }

    #[test]
    fn test_load_registry() {
        assert!(Config::default().load_registry().unwrap().is_empty());

        let path =
            env::temp_dir().join(format!("cache_aside_policies_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r##"{"operations":[{"operation":"user.get","cacheable":{"key":"#id","prefix":"user"}}]}"##,
        )
        .unwrap();
        let config = Config {
            policy_file: Some(path.clone()),
            ..Config::default()
        };
        let registry = config.load_registry().unwrap();
        assert!(registry.resolve("user.get").is_some());
        std::fs::remove_file(&path).unwrap();

        let missing = Config {
            policy_file: Some(PathBuf::from("/nonexistent/policies.json")),
            ..Config::default()
        };
        let err = missing.load_registry().unwrap_err();
        assert!(format!("{:#}", err).contains("reading policy file"));
    }
}
