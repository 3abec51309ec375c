//! Centralized Error Handling Module
//!
//! Every failure carries a unique code so request logs can be grouped by
//! cause. Codes follow the pattern CATEGORY_SPECIFIC_ERROR:
//! - API_xxx: request/response errors
//! - DB_xxx: Postgres access errors
//! - REDIS_xxx: rate limiter store errors
//! - CFG_xxx: configuration errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Field level details for validation failures
    pub details: Vec<ValidationDetail>,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// One entry of a 422 response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationDetail {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ValidationDetail {
    pub fn query(field: &str, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc: vec!["query".to_string(), field.to_string()],
            msg: msg.into(),
            kind: kind.into(),
        }
    }

    pub fn path(field: &str, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc: vec!["path".to_string(), field.to_string()],
            msg: msg.into(),
            kind: kind.into(),
        }
    }

    /// Error spanning several query fields
    pub fn model(msg: impl Into<String>) -> Self {
        Self {
            loc: vec!["query".to_string()],
            msg: format!("Value error, {}", msg.into()),
            kind: "value_error".to_string(),
        }
    }
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // API Errors
    // ============================================
    /// Malformed request
    ApiBadRequest,
    /// Missing or unknown API key
    ApiUnauthorized,
    /// Resource not found
    ApiNotFound,
    /// Query ran past its statement timeout
    ApiRequestTimeout,
    /// Query parameters failed validation
    ApiValidation,
    /// Rate limit exceeded
    ApiRateLimited,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Database Errors
    // ============================================
    /// Could not get a connection from the pool
    DbPool,
    /// Query failed for an unknown reason
    DbQuery,
    /// Postgres rejected the data (bad cast, undefined column...)
    DbData,
    /// SQL referenced a named parameter with no value
    DbMissingParam,

    // ============================================
    // Rate limiter store Errors
    // ============================================
    RedisError,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Generic Errors
    // ============================================
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiUnauthorized => "API_UNAUTHORIZED",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiRequestTimeout => "API_REQUEST_TIMEOUT",
            Self::ApiValidation => "API_VALIDATION",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            Self::DbPool => "DB_POOL",
            Self::DbQuery => "DB_QUERY",
            Self::DbData => "DB_DATA",
            Self::DbMissingParam => "DB_MISSING_PARAM",

            Self::RedisError => "REDIS_ERROR",

            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest => 400,
            Self::ApiUnauthorized => 401,
            Self::ApiNotFound => 404,
            Self::ApiRequestTimeout => 408,
            Self::ApiValidation | Self::DbData => 422,
            Self::ApiRateLimited => 429,
            _ => 500,
        }
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::ApiUnauthorized, "Invalid credentials")
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiNotFound, msg)
    }

    pub fn too_many_requests() -> Self {
        Self::new(ErrorCode::ApiRateLimited, "To many requests")
    }

    pub fn request_timeout() -> Self {
        Self::new(
            ErrorCode::ApiRequestTimeout,
            "Connection timed out: Try to provide more specific query parameters or a smaller time frame.",
        )
    }

    /// 422 with a single query field error
    pub fn validation(detail: ValidationDetail) -> Self {
        Self::validation_many(vec![detail])
    }

    pub fn validation_many(details: Vec<ValidationDetail>) -> Self {
        let message = details
            .iter()
            .map(|d| format!("{}: {}", d.loc.join("."), d.msg))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            code: ErrorCode::ApiValidation,
            message,
            details,
            source: None,
        }
    }

    pub fn missing_param(name: &str) -> Self {
        Self::new(
            ErrorCode::DbMissingParam,
            format!("No value provided for query parameter :{}", name),
        )
    }

    pub fn missing_env(key: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", key),
        )
    }

    pub fn invalid_config(key: &str, value: &str) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for {}: {:?}", key, value),
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// HTTP rendering
// ============================================

#[derive(Serialize)]
struct DetailBody<'a> {
    detail: &'a str,
}

#[derive(Serialize)]
struct ValidationBody<'a> {
    detail: &'a [ValidationDetail],
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.details.is_empty() {
            return (status, Json(ValidationBody { detail: &self.details })).into_response();
        }
        // Server-side failures keep their cause out of the body.
        let detail = if status.is_server_error() {
            "Internal server error"
        } else {
            self.message.as_str()
        };
        (status, Json(DetailBody { detail })).into_response()
    }
}

// ============================================
// Conversion from common error types
// ============================================

/// Postgres SQLSTATE for an undefined column
const PG_UNDEFINED_COLUMN: &str = "42703";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::with_source(ErrorCode::DbPool, "Database pool unavailable", err)
            }
            sqlx::Error::Database(db) => {
                let data_error = db
                    .code()
                    .map(|c| c.starts_with("22") || c == PG_UNDEFINED_COLUMN)
                    .unwrap_or(false);
                let message = db.message().to_string();
                if data_error {
                    Self::with_source(ErrorCode::DbData, message, err)
                } else {
                    Self::with_source(ErrorCode::DbQuery, message, err)
                }
            }
            _ => Self::with_source(ErrorCode::DbQuery, "Unknown database error", err),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::with_source(ErrorCode::RedisError, "Redis command failed", err)
    }
}

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "JSON error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::request_timeout();
        assert_eq!(err.code, ErrorCode::ApiRequestTimeout);
        assert_eq!(err.code_str(), "API_REQUEST_TIMEOUT");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(ErrorCode::ApiUnauthorized.http_status(), 401);
        assert_eq!(ErrorCode::ApiRequestTimeout.http_status(), 408);
        assert_eq!(ErrorCode::ApiValidation.http_status(), 422);
        assert_eq!(ErrorCode::DbData.http_status(), 422);
        assert_eq!(ErrorCode::ApiRateLimited.http_status(), 429);
        assert_eq!(ErrorCode::RedisError.http_status(), 500);
    }

    #[test]
    fn test_validation_message_joins_locations() {
        let err = AppError::validation_many(vec![
            ValidationDetail::query("limit", "must be <= 1000", "less_than_equal"),
            ValidationDetail::query("page", "must be > 0", "greater_than"),
        ]);
        assert_eq!(err.code, ErrorCode::ApiValidation);
        assert_eq!(err.message, "query.limit: must be <= 1000; query.page: must be > 0");
        assert_eq!(err.details.len(), 2);
    }

    #[test]
    fn test_server_errors_hide_message() {
        let response = AppError::internal("secret connection string").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
