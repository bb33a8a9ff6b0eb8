//! Integer error codes for logging and monitoring.

/// Stable error codes attached to every error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    ValidationError,
    JsonExtraction,
    InvalidUuid,
    Unauthorized,
    NotFound,
    SerdeJsonError,
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Integer code for dashboards and alerts.
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::BadRequest => 1001,
            ErrorCode::ValidationError => 1002,
            ErrorCode::JsonExtraction => 1003,
            ErrorCode::InvalidUuid => 1004,
            ErrorCode::Unauthorized => 1401,
            ErrorCode::NotFound => 1404,
            ErrorCode::SerdeJsonError => 1500,
            ErrorCode::InternalError => 1501,
            ErrorCode::ServiceUnavailable => 1503,
        }
    }

    /// Machine-readable identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::JsonExtraction => "JSON_EXTRACTION",
            ErrorCode::InvalidUuid => "INVALID_UUID",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::SerdeJsonError => "SERDE_JSON_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    /// Default human-readable message.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "Bad request",
            ErrorCode::ValidationError => "Request validation failed",
            ErrorCode::JsonExtraction => "Invalid JSON payload",
            ErrorCode::InvalidUuid => "Invalid UUID",
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::SerdeJsonError => "JSON serialization failed",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::ServiceUnavailable => "Service unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let all = [
            ErrorCode::BadRequest,
            ErrorCode::ValidationError,
            ErrorCode::JsonExtraction,
            ErrorCode::InvalidUuid,
            ErrorCode::Unauthorized,
            ErrorCode::NotFound,
            ErrorCode::SerdeJsonError,
            ErrorCode::InternalError,
            ErrorCode::ServiceUnavailable,
        ];
        let mut codes: Vec<i32> = all.iter().map(|c| c.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
