//! Remote token counting
//!
//! Counts must match what the completion endpoint charges, so there is no
//! local estimate: every count is a call to the provider.

use crate::completion::models::{CompletionRequest, TokenizeResponse};
use crate::config::CompletionConfig;
use crate::metrics::METRICS;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

/// Tokenizer errors
#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Tokenizer trait for different counting backends
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Number of tokens the model assigns to `text`
    async fn tokenize(&self, text: &str, token: &SecretString) -> Result<u64, TokenizerError>;

    /// Number of tokens of a whole completion request
    async fn tokenize_completion(
        &self,
        request: &CompletionRequest,
        token: &SecretString,
    ) -> Result<u64, TokenizerError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenizeTextRequest<'a> {
    model_uri: &'a str,
    text: &'a str,
}

/// Tokenizer calling the provider's `/tokenize` endpoints
pub struct RemoteTokenizer {
    client: Client,
    base_url: String,
    model_uri: String,
    folder_id: String,
}

impl RemoteTokenizer {
    /// Create a new remote tokenizer
    pub fn new(config: &CompletionConfig) -> Result<Self, TokenizerError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TokenizerError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_uri: config.model_uri(),
            folder_id: config.folder_id.clone(),
        })
    }

    async fn count<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: &SecretString,
    ) -> Result<u64, TokenizerError> {
        let url = format!("{}{}", self.base_url, path);

        let result = self.send(&url, body, token).await;
        METRICS.record_tokenize(result.is_ok());
        result
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        token: &SecretString,
    ) -> Result<u64, TokenizerError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(token.expose_secret())
            .header("x-folder-id", &self.folder_id)
            .json(body)
            .send()
            .await
            .map_err(|e| TokenizerError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenizerError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let parsed: TokenizeResponse = response
            .json()
            .await
            .map_err(|e| TokenizerError::MalformedResponse(e.to_string()))?;

        Ok(parsed.tokens.len() as u64)
    }
}

#[async_trait]
impl Tokenizer for RemoteTokenizer {
    async fn tokenize(&self, text: &str, token: &SecretString) -> Result<u64, TokenizerError> {
        let body = TokenizeTextRequest {
            model_uri: &self.model_uri,
            text,
        };
        let count = self.count("/tokenize", &body, token).await?;
        debug!("Tokenized text into {} tokens", count);
        Ok(count)
    }

    async fn tokenize_completion(
        &self,
        request: &CompletionRequest,
        token: &SecretString,
    ) -> Result<u64, TokenizerError> {
        let count = self.count("/tokenizeCompletion", request, token).await?;
        debug!("Tokenized {} messages into {} tokens", request.messages.len(), count);
        Ok(count)
    }
}
