//! Lease-based execution locks for projections.
//!
//! One lock exists per projection. The holder renews its lease between
//! batches and releases it on shutdown; a crashed holder's lease simply
//! expires and another instance takes over.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockResult {
    /// The caller now holds the lock.
    Acquired {
        /// Token that must be presented to renew or release.
        lease_token: String,
        lease_duration: Duration,
    },
    /// Another instance holds an unexpired lease.
    Held {
        /// Owner of the current lease, if known.
        current_owner: Option<String>,
    },
}

impl LockResult {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }

    pub fn lease_token(&self) -> Option<&str> {
        match self {
            Self::Acquired { lease_token, .. } => Some(lease_token),
            Self::Held { .. } => None,
        }
    }
}

/// Result of a lease renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalResult {
    Renewed { lease_duration: Duration },
    /// The lease expired, was taken over, or the token is unknown.
    Lost,
}

impl RenewalResult {
    pub fn is_renewed(&self) -> bool {
        matches!(self, Self::Renewed { .. })
    }
}

#[async_trait]
pub trait ProjectionLocker: Send + Sync {
    /// Acquires the projection's lock unless another owner holds an unexpired lease.
    ///
    /// An owner re-acquiring its own lease gets a fresh token.
    async fn try_acquire(&self, projection: &str, owner: &str, ttl: Duration)
    -> Result<LockResult>;

    /// Extends a held lease by `ttl`.
    async fn renew(&self, projection: &str, lease_token: &str, ttl: Duration)
    -> Result<RenewalResult>;

    /// Releases a held lease. Returns false if the token no longer holds it.
    async fn release(&self, projection: &str, lease_token: &str) -> Result<bool>;
}

pub(crate) fn new_lease_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn lease_expiry(
    now: chrono::DateTime<chrono::Utc>,
    ttl: Duration,
) -> chrono::DateTime<chrono::Utc> {
    now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30))
}
