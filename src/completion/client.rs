//! HTTP client for the completion and operations endpoints

use super::models::{CompletionRequest, CompletionResponse, CompletionResult, OperationAccepted, OperationStatus};
use crate::config::CompletionConfig;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use uuid::Uuid;

/// Completion provider calls
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Synchronous completion
    async fn complete(&self, request: &CompletionRequest, token: &SecretString) -> Result<CompletionResult>;

    /// Start an asynchronous completion, returning the operation id
    async fn complete_async(&self, request: &CompletionRequest, token: &SecretString) -> Result<String>;

    /// Current state of an asynchronous operation
    async fn operation(&self, operation_id: &str, token: &SecretString) -> Result<OperationStatus>;
}

/// [`CompletionApi`] over HTTPS
pub struct HttpCompletionApi {
    http: Client,
    base_url: String,
    operation_url: String,
    folder_id: String,
}

impl HttpCompletionApi {
    /// Create a new completion client
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestratorError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            operation_url: config.operation_url.trim_end_matches('/').to_string(),
            folder_id: config.folder_id.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder, token: &SecretString) -> RequestBuilder {
        builder
            .bearer_auth(token.expose_secret())
            .header("x-folder-id", &self.folder_id)
            .header("x-client-request-id", Uuid::new_v4().to_string())
    }

    /// Send and decode a JSON body; anything but 200 is an invalid response
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation_id: Option<&str>,
    ) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| OrchestratorError::from_transport(e, operation_id))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OrchestratorError::from_transport(e, operation_id))?;

        if status != StatusCode::OK {
            error!("Completion API returned {}: {}", status, body);
            return Err(OrchestratorError::InvalidResponse {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("Unexpected completion API response ({}): {}", e, body);
            OrchestratorError::malformed(body)
        })
    }
}

#[async_trait]
impl CompletionApi for HttpCompletionApi {
    async fn complete(&self, request: &CompletionRequest, token: &SecretString) -> Result<CompletionResult> {
        let url = format!("{}/completion", self.base_url);
        debug!("POST {} with {} messages", url, request.messages.len());

        let builder = self.authorized(self.http.post(&url).json(request), token);
        let response: CompletionResponse = self.send_json(builder, None).await?;
        Ok(response.result)
    }

    async fn complete_async(&self, request: &CompletionRequest, token: &SecretString) -> Result<String> {
        let url = format!("{}/completionAsync", self.base_url);
        debug!("POST {} with {} messages", url, request.messages.len());

        let builder = self.authorized(self.http.post(&url).json(request), token);
        let accepted: OperationAccepted = self.send_json(builder, None).await?;
        Ok(accepted.id)
    }

    async fn operation(&self, operation_id: &str, token: &SecretString) -> Result<OperationStatus> {
        let url = format!("{}/{}", self.operation_url, operation_id);

        let builder = self.authorized(self.http.get(&url), token);
        self.send_json(builder, Some(operation_id)).await
    }
}
