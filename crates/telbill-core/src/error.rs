//! Unified error handling for Telbill
//!
//! This module provides a single error type that covers record rejections,
//! tariff and period errors, and infrastructure failures, with automatic
//! HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // ==================== Record Rejections ====================
    #[error("Malformed record: {0}")]
    Structural(String),

    #[error("Conflicting record: {0}")]
    Uniqueness(String),

    #[error("Unknown call: {0}")]
    Referential(String),

    #[error("Temporal conflict: {0}")]
    Temporal(String),

    // ==================== Billing Errors ====================
    #[error("Invalid tariff schedule: {0}")]
    Schedule(String),

    #[error("Unparseable reference period: {0}")]
    PeriodParse(String),

    #[error("Invalid phone number: {0}")]
    PhoneSyntax(String),

    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Structural(_)
            | AppError::Schedule(_)
            | AppError::PeriodParse(_)
            | AppError::PhoneSyntax(_)
            | AppError::Validation(_)
            | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 405 Method Not Allowed
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,

            // 409 Conflict
            AppError::Uniqueness(_) | AppError::Conflict(_) | AppError::AlreadyExists(_) => {
                StatusCode::CONFLICT
            }

            // 415 Unsupported Media Type
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            // 422 Unprocessable Entity
            AppError::Referential(_) | AppError::Temporal(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Structural(_) => "structural_error",
            AppError::Uniqueness(_) => "uniqueness_error",
            AppError::Referential(_) => "referential_error",
            AppError::Temporal(_) => "temporal_error",
            AppError::Schedule(_) => "schedule_error",
            AppError::PeriodParse(_) => "period_parse_error",
            AppError::PhoneSyntax(_) => "phone_syntax_error",
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::UnsupportedMediaType(_) => "unsupported_media_type",
            AppError::MethodNotAllowed(_) => "method_not_allowed",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// True for errors that reject a call record write
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::Structural(_)
                | AppError::Uniqueness(_)
                | AppError::Referential(_)
                | AppError::Temporal(_)
                | AppError::PhoneSyntax(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::Structural("end with numbers".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Uniqueness("dup".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Referential("42".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Database("down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::UnsupportedMediaType("text/plain".to_string()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            AppError::MethodNotAllowed("GET".to_string()).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::PeriodParse("abc2017".to_string()).error_code(),
            "period_parse_error"
        );
        assert_eq!(
            AppError::PhoneSyntax("12345".to_string()).error_code(),
            "phone_syntax_error"
        );
    }

    #[test]
    fn test_rejections() {
        assert!(AppError::Temporal("overlap".to_string()).is_rejection());
        assert!(!AppError::Schedule("discount".to_string()).is_rejection());
        assert!(!AppError::Database("down".to_string()).is_rejection());
    }
}
