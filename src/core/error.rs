//! # Error Handling Module
//!
//! This module defines every error the proxy can produce, using the `thiserror`
//! crate, together with the HTTP status code each one maps to when it reaches a
//! client.
//!
//! ## Error Kinds
//!
//! - Configuration errors are fatal at startup; the process never serves traffic
//!   with a half-valid configuration.
//! - Body read errors are terminal for a single request and surface as `500`.
//! - Upstream transport errors surface as `502 Bad Gateway`. The cached query
//!   record is left untouched so a later fulfilment can try again.
//! - A missing or expired cache entry is not really a failure: it is reported as
//!   `404` and the caller is expected to re-send its original query.
//!
//! Nothing here is retried automatically.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the proxy
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the caching proxy
///
/// The `#[error("...")]` attribute implements `Display` with the given message.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Invalid endpoint URL, malformed TTL table entry, bad listen settings
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The inbound request body could not be read
    #[error("Failed to read request body: {message}")]
    BodyRead { message: String },

    /// The upstream GraphQL endpoint could not be reached or failed mid-response
    #[error("Upstream request failed: {message}")]
    UpstreamTransport { message: String },

    /// No live query record exists for the requested fingerprint
    #[error("Cache entry not found: {fingerprint}")]
    CacheEntryNotFound { fingerprint: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (configuration files, socket binding)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a body read error
    pub fn body_read<S: Into<String>>(message: S) -> Self {
        Self::BodyRead {
            message: message.into(),
        }
    }

    /// Create an upstream transport error
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::UpstreamTransport {
            message: message.into(),
        }
    }

    /// Create a cache miss for the given fingerprint
    pub fn cache_miss<S: Into<String>>(fingerprint: S) -> Self {
        Self::CacheEntryNotFound {
            fingerprint: fingerprint.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code returned to clients for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BodyRead { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamTransport { .. } => StatusCode::BAD_GATEWAY,
            Self::CacheEntryNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::BodyRead { .. } => "body_read_error",
            Self::UpstreamTransport { .. } => "upstream_transport_error",
            Self::CacheEntryNotFound { .. } => "cache_entry_not_found",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

/// Implement conversion from std::io::Error
impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_yaml::Error
impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Transport-level reqwest failures are always upstream failures
impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::upstream(err.to_string())
    }
}

/// Convert errors into HTTP responses so handlers can return `GatewayResult<Response>`
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid port: {}", port)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::GatewayError::config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::upstream("connection refused").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::cache_miss("abc").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::body_read("stream closed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_config_error_macro() {
        let err = config_error!("Invalid port: {}", 0);
        assert!(matches!(err, GatewayError::Configuration { .. }));
        assert_eq!(err.to_string(), "Configuration error: Invalid port: 0");
    }

    #[test]
    fn test_reqwest_error_is_upstream_failure() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        let err = GatewayError::from(err);

        assert!(matches!(err, GatewayError::UpstreamTransport { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_response_body() {
        let response = GatewayError::cache_miss("deadbeef").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["code"], 404);
        assert_eq!(value["error"]["type"], "cache_entry_not_found");
    }
}
