//! IAM authentication for provider API calls
//!
//! A service-account key signs a short-lived JWT which the IAM service
//! exchanges for a bearer token. [`AuthManager`] caches that token and
//! refreshes it once per expiry window, however many callers are waiting.

pub mod manager;
pub mod service_account;

pub use manager::{AuthManager, Credential, TokenProvider};
pub use service_account::{AssertionSigner, ServiceAccountKey, ServiceAccountSigner};

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to load service account key: {0}")]
    KeyLoad(String),

    #[error("Failed to sign assertion: {0}")]
    Signing(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IAM service rejected the assertion (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed IAM response: {0}")]
    MalformedResponse(String),
}
