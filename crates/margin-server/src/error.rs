//! Error types for the HTTP surface.

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use margin::SandboxError;

/// Errors returned by request handlers, rendered as `{"error": message}`
#[derive(Debug, Error)]
pub enum ApiError {
    /// File access or path resolution failed
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Sandbox(e) => match e {
                SandboxError::InvalidPath(_) | SandboxError::NotAFile(_) => StatusCode::BAD_REQUEST,
                SandboxError::ProjectNotFound(_) | SandboxError::NotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                SandboxError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                SandboxError::NotText(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                SandboxError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Errors that stop the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configured CORS origin is not a valid header value
    #[error("invalid allowed origin: {0}")]
    InvalidOrigin(String),
    /// The listen address could not be bound
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
    /// The server loop failed
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}
