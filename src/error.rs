//! Crate-level error taxonomy
//!
//! Component errors convert into [`OrchestratorError`] so callers of
//! `get_answer` only have to match on one enum.

use crate::auth::AuthError;
use crate::cache::CacheError;
use crate::prompt::SanitizeError;
use crate::tokenizer::TokenizerError;
use thiserror::Error;

/// Result alias used across the orchestrator
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced to the caller of the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The prompt was empty after sanitization. Expected, user-caused.
    #[error("Message is empty or consists only of unsupported characters")]
    EmptyPrompt,

    #[error("Tokenization failed: {0}")]
    Tokenization(#[from] TokenizerError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid response from completion API (status {}): {body}", .status.map(|s| s.to_string()).unwrap_or_else(|| "n/a".to_string()))]
    InvalidResponse { status: Option<u16>, body: String },

    #[error("Request timed out{}: {message}", .operation_id.as_ref().map(|id| format!(" (operation_id: {})", id)).unwrap_or_default())]
    RequestTimeout {
        operation_id: Option<String>,
        message: String,
    },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OrchestratorError {
    /// Build an `InvalidResponse` without an HTTP status (shape errors)
    pub fn malformed(body: impl Into<String>) -> Self {
        Self::InvalidResponse {
            status: None,
            body: body.into(),
        }
    }

    /// Map a reqwest failure onto the taxonomy
    pub fn from_transport(err: reqwest::Error, operation_id: Option<&str>) -> Self {
        if err.is_timeout() {
            Self::RequestTimeout {
                operation_id: operation_id.map(str::to_string),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            Self::malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }

    /// Whether the error was caused by the user input rather than the system
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::EmptyPrompt)
    }
}

impl From<SanitizeError> for OrchestratorError {
    fn from(err: SanitizeError) -> Self {
        match err {
            SanitizeError::Empty => Self::EmptyPrompt,
        }
    }
}
