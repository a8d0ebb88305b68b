//! Stored Entry Module
//!
//! One value held by the in-memory store, with its expiry deadline.

use std::time::Duration;

use super::Expiry;
use crate::policy::Ttl;

// == Stored Entry ==
/// Bytes plus write and expiry timestamps.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// The stored bytes
    pub value: Vec<u8>,
    /// Write timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates an entry written at `now_ms`.
    pub fn new(value: Vec<u8>, ttl: Ttl, now_ms: u64) -> Self {
        let expires_at = ttl
            .as_secs()
            .map(|secs| now_ms.saturating_add(secs.saturating_mul(1000)));

        Self {
            value,
            created_at: now_ms,
            expires_at,
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now_ms` reaches its deadline.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Remaining ==
    /// Remaining lifetime as seen at `now_ms`.
    pub fn remaining(&self, now_ms: u64) -> Expiry {
        match self.expires_at {
            None => Expiry::Never,
            Some(expires) if expires > now_ms => {
                Expiry::In(Duration::from_millis(expires - now_ms))
            }
            Some(_) => Expiry::Missing,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    fn secs(n: u64) -> Ttl {
        Ttl::Seconds(NonZeroU64::new(n).unwrap())
    }

    #[test]
    fn test_entry_without_expiry() {
        let entry = StoredEntry::new(b"v".to_vec(), Ttl::Never, 1_000);

        assert_eq!(entry.value, b"v");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired(u64::MAX));
        assert_eq!(entry.remaining(5_000), Expiry::Never);
    }

    #[test]
    fn test_entry_with_ttl() {
        let entry = StoredEntry::new(b"v".to_vec(), secs(60), 1_000);

        assert_eq!(entry.created_at, 1_000);
        assert_eq!(entry.expires_at, Some(61_000));
        assert!(!entry.is_expired(60_999));
        assert_eq!(
            entry.remaining(31_000),
            Expiry::In(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = StoredEntry::new(b"v".to_vec(), secs(1), 0);

        // Expired exactly when the deadline is reached
        assert!(entry.is_expired(1_000));
        assert_eq!(entry.remaining(1_000), Expiry::Missing);
    }
}
