//! Error types shared by the gateway.
//!
//! Every failure is scoped to a single request. [`GatewayError`] is the type
//! handlers return; it carries the HTTP status and a stable machine-readable
//! code so clients can branch on it without parsing messages.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

/// Failure talking to a model or embedding backend.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    Decode(String),

    #[error("Upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl UpstreamError {
    /// Whether the upstream call was cut off by a client-side timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            UpstreamError::Http(e) => e.is_timeout(),
            UpstreamError::Timeout(_) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Failed to load document: {0}")]
    Document(String),

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("Model not found")]
    ModelNotFound,

    #[error("Knowledge base not found")]
    KnowledgeBaseNotFound,

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        GatewayError::InvalidRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_)
            | GatewayError::UnsupportedFileType(_)
            | GatewayError::Document(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::ModelNotFound | GatewayError::KnowledgeBaseNotFound => {
                StatusCode::NOT_FOUND
            }
            GatewayError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code included in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::UnsupportedFileType(_) => "unsupported_file_type",
            GatewayError::Document(_) => "document_error",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::ModelNotFound | GatewayError::KnowledgeBaseNotFound => "not_found",
            GatewayError::Upstream(e) if e.is_timeout() => "upstream_timeout",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::Io(_) => "internal_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(code = self.code(), %status, "{message}");
        } else {
            debug!(code = self.code(), %status, "{message}");
        }

        (
            status,
            Json(json!({
                "error": message,
                "code": self.code(),
            })),
        )
            .into_response()
    }
}
