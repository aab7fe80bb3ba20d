//! Error types for Chanfeed services
//!
//! Provides the error taxonomy shared by the repository, the entity
//! service and the read aggregator:
//! - Not-found errors, only where absence is itself exceptional
//! - Conflict errors raised by storage uniqueness constraints
//! - Operational errors (storage, transport, decoding)
//! - Error codes for machine-readable identification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Resource errors (4xxx)
    ChannelNotFound,

    // Conflict errors (5xxx)
    Conflict,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    QueueError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Resources (4xxx)
            ErrorCode::ChannelNotFound => 4002,

            // Conflicts (5xxx)
            ErrorCode::Conflict => 5001,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // External (8xxx)
            ErrorCode::QueueError => 8005,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Channel not found: {name}")]
    ChannelNotFound { name: String },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Transport errors
    #[error("Queue error: {message}")]
    QueueError { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ChannelNotFound { .. } => ErrorCode::ChannelNotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::QueueError { .. } => ErrorCode::QueueError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Absence of an entity the caller required
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::ChannelNotFound { .. })
    }

    /// Storage rejected a write because the business key is taken
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Duplicate { .. })
    }

    /// Infrastructure failure, as opposed to a domain outcome
    pub fn is_operational(&self) -> bool {
        !self.is_not_found() && !self.is_conflict()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::QueueError {
            message: err.to_string()
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ChannelNotFound { name: "alpha".into() };
        assert_eq!(err.code(), ErrorCode::ChannelNotFound);
        assert_eq!(err.code().as_code(), 4002);
        assert!(err.is_not_found());
        assert!(!err.is_operational());
    }

    #[test]
    fn test_conflict_error() {
        let err = AppError::Duplicate {
            message: "channel alpha".into(),
        };
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_operational_error() {
        let err = AppError::Database(sea_orm::DbErr::Conn(
            sea_orm::RuntimeErr::Internal("connection refused".into()),
        ));
        assert_eq!(err.code(), ErrorCode::DatabaseError);
        assert!(err.is_operational());
        assert!(err.to_string().contains("connection refused"));
    }
}
