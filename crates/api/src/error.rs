//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind};
use event_store::EventStoreError;
use projections::ProjectionError;
use serde::Serialize;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed read model row does not exist.
    #[error("{message_key} ({id})")]
    NotFound {
        id: &'static str,
        message_key: &'static str,
    },

    /// The request could not be interpreted.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Localizable message key.
    pub error: String,
    /// Stable id of the failure site.
    pub id: &'static str,
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn not_found(id: &'static str, message_key: &'static str) -> Self {
        Self::NotFound { id, message_key }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BadRequest(_) => ErrorKind::InvalidArgument,
            Self::Domain(err) => err.kind(),
            Self::Projection(_) | Self::EventStore(_) => ErrorKind::Internal,
        }
    }

    fn body(&self) -> ErrorBody {
        let (id, error) = match self {
            Self::NotFound { id, message_key } => (*id, message_key.to_string()),
            Self::BadRequest(message) => ("API-B4dRq", message.clone()),
            Self::Domain(err) => (err.id(), err.message_key().to_string()),
            Self::Projection(_) => ("API-Pr0jE", "Errors.Internal".to_string()),
            Self::EventStore(_) => ("API-Ev5tE", "Errors.Internal".to_string()),
        };
        ErrorBody {
            error,
            id,
            kind: self.kind(),
        }
    }
}

/// HTTP status of an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        metrics::counter!("api_errors_total", "kind" => kind.as_str()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, axum::Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_identity() {
        let err = ApiError::from(DomainError::precondition_failed(
            "COMMA-wG9p1",
            "Errors.Org.DefaultOrgNotDeletable",
        ));
        let body = err.body();
        assert_eq!(body.id, "COMMA-wG9p1");
        assert_eq!(body.error, "Errors.Org.DefaultOrgNotDeletable");
        assert_eq!(status_for(body.kind), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn uniqueness_violations_conflict() {
        let err = ApiError::from(DomainError::from(
            EventStoreError::UniqueConstraintViolation {
                namespace: "org-name".into(),
                key: "Acme".into(),
                message_key: "Errors.Org.AlreadyExists".into(),
            },
        ));
        assert_eq!(status_for(err.kind()), StatusCode::CONFLICT);
        assert_eq!(err.body().error, "Errors.Org.AlreadyExists");
    }

    #[test]
    fn internal_failures_hide_details() {
        let err = ApiError::from(EventStoreError::InvalidPush("empty push".into()));
        let body = err.body();
        assert_eq!(body.kind, ErrorKind::Internal);
        assert_eq!(body.error, "Errors.Internal");
    }
}
