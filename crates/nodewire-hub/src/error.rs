//! Hub error types with HTTP status code mapping.
//!
//! [`HubError`] covers the HTTP debug surface and startup failures. It
//! implements `axum::response::IntoResponse` to produce structured JSON
//! error bodies. The websocket path never uses these: protocol problems
//! there degrade to echo/info replies instead of failing the connection.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Structured error detail in HTTP responses.
#[derive(Debug, Clone, Serialize)]
pub struct HubErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Hub errors for the HTTP surface and startup.
#[derive(Debug, Error)]
pub enum HubError {
    /// Entity not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Snapshot load/save failed at startup or persistence time.
    #[error("snapshot: {0}")]
    Snapshot(#[from] nodewire_core::CoreError),

    /// Listener/socket setup failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            HubError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            HubError::Snapshot(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SNAPSHOT"),
            HubError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO"),
        };
        let body = serde_json::json!({
            "success": false,
            "error": HubErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        });
        (status, axum::Json(body)).into_response()
    }
}
