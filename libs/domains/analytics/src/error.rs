//! Analytics domain error types

use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Domain error taxonomy.
///
/// The first three variants describe bad input and are recoverable per
/// message or per request; `Store` and `IdentityUnavailable` describe
/// infrastructure trouble and surface as 5xx.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Message arrived on a topic the normalizer does not know.
    #[error("unknown source topic: {topic}")]
    UnknownSource { topic: String },

    /// Payload could not be decoded or is missing required fields.
    #[error("malformed payload: {detail}")]
    Malformed { detail: String },

    /// Input decoded fine but violates a domain rule.
    #[error("{message}")]
    Validation { message: String },

    /// The analytical store rejected or never received a request.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The identity service could not be reached or answered 5xx.
    #[error("identity service unavailable: {detail}")]
    IdentityUnavailable { detail: String },

    /// Token missing, expired or rejected by the identity service.
    #[error("unauthorized: {detail}")]
    Unauthorized { detail: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AnalyticsError {
    /// Whether a consumer should drop the message (ack and move on)
    /// rather than retry it. Bad input never becomes good by retrying;
    /// store failures do.
    pub fn is_poison(&self) -> bool {
        matches!(
            self,
            AnalyticsError::UnknownSource { .. }
                | AnalyticsError::Malformed { .. }
                | AnalyticsError::Validation { .. }
        )
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::Malformed {
            detail: err.to_string(),
        }
    }
}

impl From<AnalyticsError> for AppError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::UnknownSource { .. }
            | AnalyticsError::Malformed { .. }
            | AnalyticsError::Validation { .. } => AppError::BadRequest(err.to_string()),
            AnalyticsError::Store(store) => AppError::ServiceUnavailable(store.to_string()),
            AnalyticsError::IdentityUnavailable { detail } => AppError::ServiceUnavailable(detail),
            AnalyticsError::Unauthorized { detail } => AppError::Unauthorized(detail),
            AnalyticsError::Internal { message } => AppError::InternalServerError(message),
        }
    }
}

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_poison_classification() {
        assert!(AnalyticsError::UnknownSource {
            topic: "nope".to_string()
        }
        .is_poison());
        assert!(AnalyticsError::Malformed {
            detail: "bad json".to_string()
        }
        .is_poison());
        assert!(!AnalyticsError::Store(StoreError::Status {
            status: 500,
            body: "boom".to_string()
        })
        .is_poison());
    }

    #[test]
    fn test_store_errors_surface_as_503() {
        let err = AnalyticsError::Store(StoreError::Timeout { timeout_ms: 10000 });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_validation_errors_surface_as_400() {
        let err = AnalyticsError::Validation {
            message: "rating must be between 1 and 5".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
