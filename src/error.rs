//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror. Cache failures are kept apart
//! from the errors of the wrapped business operation, which travel untouched inside
//! [`InterceptError::Operation`].

use std::fmt;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No policy is registered for the operation
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Key expression could not be compiled
    #[error("Malformed key expression `{expression}`: {message}")]
    Expression { expression: String, message: String },

    /// Key expression references an argument the call does not carry
    #[error("Unknown argument `{0}` in key expression")]
    UnknownArgument(String),

    /// Dotted path does not resolve on the concrete argument value
    #[error("Path `{path}` does not resolve on argument `{argument}`")]
    UnresolvedPath { argument: String, path: String },

    /// Argument value could not be captured for key evaluation
    #[error("Argument `{name}` is not representable: {message}")]
    Argument { name: String, message: String },

    /// Policy declaration is invalid
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Store unreachable, connection reset or command failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Store call exceeded its time bound
    #[error("Store {operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// Store refused the request (size limits, capacity)
    #[error("Store rejected request: {0}")]
    Rejected(String),

    /// Cached bytes could not be turned back into a value
    #[error("Decode error: {0}")]
    Decode(String),

    /// Value could not be serialized for storage
    #[error("Encode error: {0}")]
    Encode(String),
}

impl CacheError {
    /// Returns true for errors caused by policy or key-expression configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CacheError::UnknownOperation(_)
                | CacheError::Expression { .. }
                | CacheError::UnknownArgument(_)
                | CacheError::UnresolvedPath { .. }
                | CacheError::Argument { .. }
                | CacheError::InvalidPolicy(_)
        )
    }

    /// Returns true for errors raised while talking to the store.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CacheError::Transport(_) | CacheError::Timeout { .. } | CacheError::Rejected(_)
        )
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Transport(err.to_string())
    }
}

// == Intercept Error ==
/// Error returned by intercepted calls.
///
/// `Operation` carries the wrapped operation's own error unchanged. `Cache` only
/// appears for configuration errors when the interceptor runs in strict mode.
#[derive(Debug)]
pub enum InterceptError<E> {
    Operation(E),
    Cache(CacheError),
}

impl<E: fmt::Display> fmt::Display for InterceptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptError::Operation(err) => err.fmt(f),
            InterceptError::Cache(err) => write!(f, "cache configuration error: {}", err),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for InterceptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterceptError::Operation(err) => err.source(),
            InterceptError::Cache(err) => Some(err),
        }
    }
}

impl<E> InterceptError<E> {
    /// Returns the business error, if this is one.
    pub fn into_operation(self) -> Option<E> {
        match self {
            InterceptError::Operation(err) => Some(err),
            InterceptError::Cache(_) => None,
        }
    }

    pub fn is_cache(&self) -> bool {
        matches!(self, InterceptError::Cache(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(CacheError::UnknownArgument("userId".into()).is_configuration());
        assert!(CacheError::InvalidPolicy("zero ttl".into()).is_configuration());
        assert!(!CacheError::Transport("reset".into()).is_configuration());
        assert!(!CacheError::Decode("bad".into()).is_configuration());
    }

    #[test]
    fn test_transport_classification() {
        let timeout = CacheError::Timeout {
            operation: "get",
            after_ms: 250,
        };
        assert!(timeout.is_transport());
        assert_eq!(timeout.to_string(), "Store get timed out after 250ms");
        assert!(!CacheError::Decode("bad".into()).is_transport());
    }

    #[test]
    fn test_intercept_error_keeps_operation_error() {
        let err: InterceptError<&str> = InterceptError::Operation("db down");
        assert!(!err.is_cache());
        assert_eq!(err.into_operation(), Some("db down"));

        let err: InterceptError<&str> =
            InterceptError::Cache(CacheError::UnknownOperation("x".into()));
        assert!(err.is_cache());
        assert_eq!(err.into_operation(), None);
    }
}
