//! Error types for the shopping assistant.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors from building a prompt or calling the chat completions API.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("parse error: {0}")]
    Parse(String),

    /// The model returned no usable text.
    #[error("empty reply")]
    EmptyReply,

    #[error("catalog unavailable: {0}")]
    Catalog(String),
}

impl From<RepositoryError> for AssistantError {
    fn from(e: RepositoryError) -> Self {
        Self::Catalog(e.to_string())
    }
}

/// Error body returned by the chat completions API.
#[derive(Debug, serde::Deserialize)]
pub(super) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, serde::Deserialize)]
pub(super) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}
