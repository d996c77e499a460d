//! Error types for relay operations

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Custom error type for file relay operations
#[derive(Debug)]
pub enum RelayError {
    /// Required upload field missing or unusable
    Validation(String),
    /// Malformed base64 payload
    Decode(String),
    /// Disk or filesystem failure while persisting or reading bytes
    Storage(String),
    /// Unresolved token, or the stored file vanished from disk
    NotFound(String),
    /// Identifier collision on register
    Conflict(String),
    /// Public tunnel setup failure
    Tunnel(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Validation(msg) => write!(f, "{}", msg),
            RelayError::Decode(msg) => write!(f, "{}", msg),
            RelayError::Storage(msg) => write!(f, "storage error: {}", msg),
            RelayError::NotFound(msg) => write!(f, "{}", msg),
            RelayError::Conflict(msg) => write!(f, "conflict: {}", msg),
            RelayError::Tunnel(msg) => write!(f, "tunnel error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => RelayError::NotFound("file not found".to_string()),
            _ => RelayError::Storage(err.to_string()),
        }
    }
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Conflict(_) => StatusCode::CONFLICT,
            RelayError::Decode(_) | RelayError::Storage(_) | RelayError::Tunnel(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
