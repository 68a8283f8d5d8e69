//! Error types for SynthesisTalk services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for tool, LLM, and store failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    UnsupportedFileType,
    PayloadTooLarge,

    // Session errors (2xxx)
    MissingSession,

    // Rule violations (3xxx)
    Forbidden,

    // Resource errors (4xxx)
    NotFound,
    SessionNotFound,
    ContextNotFound,
    DocumentNotFound,
    TaskNotFound,
    UnknownTool,

    // Conflict errors (5xxx)
    Conflict,
    DuplicateDocument,

    // Rate limiting (6xxx)
    RateLimited,

    // Storage errors (7xxx)
    StorageError,

    // External service errors (8xxx)
    UpstreamError,
    ToolFailure,
    LlmTimeout,
    SearchError,
    ExtractionError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::UnsupportedFileType => 1003,
            ErrorCode::PayloadTooLarge => 1004,

            // Session (2xxx)
            ErrorCode::MissingSession => 2001,

            // Rules (3xxx)
            ErrorCode::Forbidden => 3001,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::SessionNotFound => 4002,
            ErrorCode::ContextNotFound => 4003,
            ErrorCode::DocumentNotFound => 4004,
            ErrorCode::TaskNotFound => 4005,
            ErrorCode::UnknownTool => 4006,

            // Conflicts (5xxx)
            ErrorCode::Conflict => 5001,
            ErrorCode::DuplicateDocument => 5002,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Storage (7xxx)
            ErrorCode::StorageError => 7001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::ToolFailure => 8002,
            ErrorCode::LlmTimeout => 8003,
            ErrorCode::SearchError => 8004,
            ErrorCode::ExtractionError => 8005,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Unsupported file type '{extension}'. Supported types: {supported}")]
    UnsupportedFileType { extension: String, supported: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    // Session errors
    #[error("Missing session ID")]
    MissingSession,

    // Rule violations
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Context not found: {id}")]
    ContextNotFound { id: String },

    #[error("Document '{filename}' not found in context")]
    DocumentNotFound { filename: String },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    #[error("File '{filename}' appears to be a duplicate of '{existing}'")]
    DuplicateDocument { filename: String, existing: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    // External service errors
    #[error("Tool '{tool}' failed: {message}")]
    ToolFailure { tool: String, message: String },

    #[error("LLM backend '{backend}' timed out after {timeout_ms}ms")]
    Timeout { backend: String, timeout_ms: u64 },

    #[error("LLM backend '{backend}' error: {message}")]
    Upstream { backend: String, message: String },

    #[error("Web search error: {message}")]
    Search { message: String },

    #[error("File processing error: {message}")]
    Extraction { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::UnsupportedFileType { .. } => ErrorCode::UnsupportedFileType,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::MissingSession => ErrorCode::MissingSession,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            AppError::ContextNotFound { .. } => ErrorCode::ContextNotFound,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            AppError::UnknownTool { .. } => ErrorCode::UnknownTool,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::DuplicateDocument { .. } => ErrorCode::DuplicateDocument,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::ToolFailure { .. } => ErrorCode::ToolFailure,
            AppError::Timeout { .. } => ErrorCode::LlmTimeout,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::Search { .. } => ErrorCode::SearchError,
            AppError::Extraction { .. } => ErrorCode::ExtractionError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::MissingField { .. } |
            AppError::UnsupportedFileType { .. } |
            AppError::MissingSession |
            AppError::Forbidden { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } |
            AppError::SessionNotFound { .. } |
            AppError::ContextNotFound { .. } |
            AppError::DocumentNotFound { .. } |
            AppError::TaskNotFound { .. } |
            AppError::UnknownTool { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Duplicate { .. } |
            AppError::DuplicateDocument { .. } => StatusCode::CONFLICT,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 422 Unprocessable Entity
            AppError::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Storage { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::ToolFailure { .. } |
            AppError::Upstream { .. } |
            AppError::Search { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Errors the reasoning loop absorbs as a note instead of failing the request
    pub fn is_recoverable_tool_error(&self) -> bool {
        matches!(
            self,
            AppError::ToolFailure { .. }
                | AppError::UnknownTool { .. }
                | AppError::Search { .. }
                | AppError::HttpClient(_)
        )
    }

    /// Wrap any error raised while a tool ran into a `ToolFailure`
    pub fn into_tool_failure(self, tool: &str) -> AppError {
        match self {
            err @ AppError::ToolFailure { .. } | err @ AppError::UnknownTool { .. } => err,
            other => AppError::ToolFailure {
                tool: tool.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub numeric_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                numeric_code: code.as_code(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage {
            message: err.to_string()
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ContextNotFound { id: "abc123".into() };
        assert_eq!(err.code(), ErrorCode::ContextNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Message must not be empty".into(),
            field: Some("message".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_service_unavailable() {
        let err = AppError::ServiceUnavailable {
            message: "all LLM backends failed".into()
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_server_error());
        assert_eq!(err.code().as_code(), 9999);
    }

    #[test]
    fn test_unknown_tool_is_recoverable() {
        let err = AppError::UnknownTool { name: "teleport".into() };
        assert!(err.is_recoverable_tool_error());
        assert!(!AppError::ServiceUnavailable { message: "down".into() }.is_recoverable_tool_error());
    }

    #[test]
    fn test_into_tool_failure_wraps_other_errors() {
        let err = AppError::ServiceUnavailable { message: "down".into() }.into_tool_failure("summarizer");
        match err {
            AppError::ToolFailure { tool, message } => {
                assert_eq!(tool, "summarizer");
                assert!(message.contains("down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let unknown = AppError::UnknownTool { name: "x".into() }.into_tool_failure("x");
        assert_eq!(unknown.code(), ErrorCode::UnknownTool);
    }
}
