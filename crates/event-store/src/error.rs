use thiserror::Error;

use crate::{AggregateId, ExpectedVersion, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer committed to the aggregate after the caller loaded it.
    #[error(
        "Concurrency conflict for {aggregate_type} {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: String,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        actual: Version,
    },

    /// An `add` claim collided with an active unique-constraint entry.
    #[error("Unique constraint violated: {namespace}:{key}")]
    UniqueConstraintViolation {
        namespace: String,
        key: String,
        message_key: String,
    },

    /// The push request was malformed and was rejected before touching storage.
    #[error("Invalid push: {0}")]
    InvalidPush(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConcurrencyConflict { .. } => "concurrency",
            Self::UniqueConstraintViolation { .. } => "unique_constraint",
            Self::InvalidPush(_) => "invalid",
            Self::Database(_) | Self::Migration(_) => "database",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
