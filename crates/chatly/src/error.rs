//! Error taxonomy for the chat service.
//!
//! Four kinds, matching how failures surface to the client: configuration
//! (no usable completion backend), validation (bad request shape or state),
//! persistence (store read/write failure), and upstream (completion backend
//! non-success status or network failure). Configuration and validation are
//! terminal for the current send attempt; there are no automatic retries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Persistence(String),
    #[error("upstream error ({status}): {detail}")]
    Upstream { status: u16, detail: String },
}

impl ChatError {
    pub fn upstream(status: u16, detail: impl Into<String>) -> Self {
        ChatError::Upstream {
            status,
            detail: detail.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::Configuration(_) | ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

// Store-layer functions stay on anyhow; anything that bubbles up to a
// handler is a persistence failure by definition.
impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
