//! Domain error types.
//!
//! Every rejection carries a stable error id and a message key so callers can
//! localize it. The [`ErrorKind`] is what crosses the API boundary.

use std::time::Duration;

use event_store::EventStoreError;
use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failure, stable across layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    PreconditionFailed,
    AlreadyExists,
    PermissionDenied,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::PreconditionFailed => "precondition_failed",
            Self::AlreadyExists => "already_exists",
            Self::PermissionDenied => "permission_denied",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The input failed validation before any state was consulted.
    #[error("{message_key} ({id})")]
    InvalidArgument {
        id: &'static str,
        message_key: &'static str,
    },

    /// The addressed aggregate or entry does not exist.
    #[error("{message_key} ({id})")]
    NotFound {
        id: &'static str,
        message_key: &'static str,
    },

    /// The aggregate is not in a state that allows the command.
    #[error("{message_key} ({id})")]
    PreconditionFailed {
        id: &'static str,
        message_key: &'static str,
    },

    /// A uniqueness rule rejected the command.
    #[error("{message_key} ({id})")]
    AlreadyExists {
        id: &'static str,
        message_key: String,
        /// The contested `namespace:key`, empty for aggregate-level checks.
        constraint: String,
    },

    /// The caller may not perform the command.
    #[error("{message_key} ({id})")]
    PermissionDenied {
        id: &'static str,
        message_key: &'static str,
    },

    /// A read model has not caught up with an aggregate the command relies on.
    #[error("read model lagging: {message_key} ({id})")]
    StaleReadModel {
        id: &'static str,
        message_key: &'static str,
    },

    /// Another writer changed an aggregate between load and push.
    #[error("Concurrent modification: {0}")]
    Conflict(#[source] EventStoreError),

    /// The command did not finish within its deadline.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[source] EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn invalid_argument(id: &'static str, message_key: &'static str) -> Self {
        Self::InvalidArgument { id, message_key }
    }

    pub fn not_found(id: &'static str, message_key: &'static str) -> Self {
        Self::NotFound { id, message_key }
    }

    pub fn precondition_failed(id: &'static str, message_key: &'static str) -> Self {
        Self::PreconditionFailed { id, message_key }
    }

    pub fn already_exists(id: &'static str, message_key: &'static str) -> Self {
        Self::AlreadyExists {
            id,
            message_key: message_key.to_string(),
            constraint: String::new(),
        }
    }

    pub fn permission_denied(id: &'static str, message_key: &'static str) -> Self {
        Self::PermissionDenied { id, message_key }
    }

    pub fn stale_read_model(id: &'static str, message_key: &'static str) -> Self {
        Self::StaleReadModel { id, message_key }
    }

    /// The classification reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } | Self::StaleReadModel { .. } => ErrorKind::NotFound,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Conflict(_) | Self::Timeout(_) | Self::EventStore(_) | Self::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Stable identifier of the failure site.
    pub fn id(&self) -> &'static str {
        match self {
            Self::InvalidArgument { id, .. }
            | Self::NotFound { id, .. }
            | Self::PreconditionFailed { id, .. }
            | Self::AlreadyExists { id, .. }
            | Self::PermissionDenied { id, .. }
            | Self::StaleReadModel { id, .. } => id,
            Self::Conflict(_) => "V2-Cfl1t",
            Self::Timeout(_) => "COMMAND-Tm0ut",
            Self::EventStore(_) => "V2-Es0rE",
            Self::Serialization(_) => "V2-S3rDe",
        }
    }

    /// Localization key for the message shown to users.
    pub fn message_key(&self) -> &str {
        match self {
            Self::InvalidArgument { message_key, .. }
            | Self::NotFound { message_key, .. }
            | Self::PreconditionFailed { message_key, .. }
            | Self::PermissionDenied { message_key, .. }
            | Self::StaleReadModel { message_key, .. } => message_key,
            Self::AlreadyExists { message_key, .. } => message_key,
            Self::Conflict(_) | Self::Timeout(_) | Self::EventStore(_) | Self::Serialization(_) => {
                "Errors.Internal"
            }
        }
    }

    /// Returns true if re-running the command from a fresh load may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::StaleReadModel { .. })
    }
}

impl From<EventStoreError> for DomainError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::ConcurrencyConflict { .. } => Self::Conflict(error),
            EventStoreError::UniqueConstraintViolation {
                namespace,
                key,
                message_key,
            } => Self::AlreadyExists {
                id: "V2-lNqd2",
                message_key,
                constraint: format!("{namespace}:{key}"),
            },
            other => Self::EventStore(other),
        }
    }
}
