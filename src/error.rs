//! Error types for satchel

use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: i64, required: i64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// Machine-readable error code returned to clients
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::NotFound(_) => "NOT_FOUND",
            MarketError::InvalidState(_) => "INVALID_STATE",
            MarketError::ValidationFailed(_) => "VALIDATION_FAILED",
            MarketError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            MarketError::Unauthorized(_) => "UNAUTHORIZED",
            MarketError::Forbidden(_) => "FORBIDDEN",
            MarketError::Conflict(_) => "CONFLICT",
            MarketError::Database(_) => "DATABASE_ERROR",
            MarketError::Config(_) => "CONFIG_ERROR",
            MarketError::Io(_) => "IO_ERROR",
            MarketError::Json(_) => "JSON_ERROR",
            MarketError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this error surfaces as at the request boundary
    pub fn status(&self) -> StatusCode {
        match self {
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::InvalidState(_) => StatusCode::CONFLICT,
            MarketError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            MarketError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            MarketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller. Store/internal errors are
    /// logged server-side and replaced with a generic message.
    pub fn public_message(&self) -> String {
        match self {
            MarketError::Database(_)
            | MarketError::Config(_)
            | MarketError::Io(_)
            | MarketError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            MarketError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MarketError::InvalidState("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            MarketError::InsufficientBalance {
                available: 10,
                required: 15
            }
            .status(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn test_internal_errors_hidden_from_clients() {
        let err = MarketError::Database("secret table layout".into());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}
