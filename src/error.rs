//! Error types for llm-relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::proxy::headers::json_response;

/// Result type alias for llm-relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for llm-relay.
///
/// Every variant renders as `{"error": <message>}` with the standard header
/// set. Causes behind `InvalidJson`, `Transport`, `MalformedUpstream` and
/// `Internal` are kept for logs and never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("No API key available for '{provider}'")]
    MissingCredential { provider: String },

    #[error("Upstream returned {status}")]
    Upstream { status: StatusCode, body: String },

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode upstream response: {0}")]
    MalformedUpstream(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code sent to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidJson(_) => StatusCode::BAD_REQUEST,
            Error::MissingCredential { .. } => StatusCode::UNAUTHORIZED,
            Error::Upstream { status, .. } => *status,
            Error::Transport(_) | Error::MalformedUpstream(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message placed in the `error` field of the response body.
    pub fn public_message(&self) -> &str {
        match self {
            Error::InvalidJson(_) => "Bad Request: Invalid JSON",
            Error::MissingCredential { .. } => "Unauthorized: API key is missing",
            Error::Upstream { body, .. } => body.as_str(),
            _ => "Internal Server Error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.public_message() });
        json_response(self.status(), &body)
    }
}
