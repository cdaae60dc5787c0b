//! # Error Handling Module
//!
//! Every failure the gateway can report lives in [`GatewayError`]. Handlers return
//! `GatewayResult<T>` and let the `IntoResponse` impl below turn the error into the
//! wire format shared by the whole HTTP surface:
//!
//! ```json
//! { "error": "User not found" }
//! ```
//!
//! Nothing escapes the router or forwarder as an unhandled fault; transport errors
//! from the upstream client are folded into [`GatewayError::Proxy`] before they reach
//! the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Fixed message returned to callers when a worker cannot be reached
pub const PROXY_ERROR_MESSAGE: &str = "Internal proxy error";

/// Error types for the users API, the forwarder and process startup
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// The `{id}` path segment is absent or not a UUID
    #[error("{message}")]
    InvalidIdentifier { message: String },

    /// A create/update payload did not carry the fields it needs
    #[error("{message}")]
    Validation { message: String },

    /// No user record matches a well-formed identifier
    #[error("{message}")]
    NotFound { message: String },

    /// No local route matched and this node has no worker pool to forward to
    #[error("Endpoint not found.")]
    EndpointNotFound,

    /// The outbound request to a worker failed (refused, reset, timed out)
    #[error("Internal proxy error")]
    Proxy { worker: String, reason: String },

    /// Configuration-related errors (invalid values, unreadable files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (socket binding, file operations)
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl GatewayError {
    /// Create an invalid identifier error with a custom message
    pub fn invalid_id<S: Into<String>>(message: S) -> Self {
        Self::InvalidIdentifier {
            message: message.into(),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error with a custom message
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a proxy error for the given worker
    pub fn proxy<W: Into<String>, R: Into<String>>(worker: W, reason: R) -> Self {
        Self::Proxy {
            worker: worker.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidIdentifier { .. } => StatusCode::BAD_REQUEST,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::EndpointNotFound => StatusCode::NOT_FOUND,
            Self::Proxy { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for logs and metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "invalid_identifier",
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::EndpointNotFound => "endpoint_not_found",
            Self::Proxy { .. } => "proxy_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: format!("Failed to parse config: {}", err),
        }
    }
}

/// Convert errors into `{ "error": <message> }` JSON responses.
///
/// The proxy variant always renders the fixed message; the worker address and the
/// underlying transport error only go to the logs.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({ "error": self.to_string() });

        (status, Json(body)).into_response()
    }
}
