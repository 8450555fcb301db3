//! Conversational completion orchestrator
//!
//! One `get_answer` call authenticates, cleans the prompt, records the user
//! turn, sends the system prompt plus the stored context to the provider
//! and records the answer as an assistant turn.

use super::client::{CompletionApi, HttpCompletionApi};
use super::models::{CompletionRequest, CompletionResult};
use super::poll::{poll_until, PollError, PollSchedule};
use crate::auth::{AuthManager, ServiceAccountKey, ServiceAccountSigner, TokenProvider};
use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::config::{CacheBackend, Config};
use crate::context::{total_tokens, CacheContextStore, ContextStore, Turn};
use crate::error::{OrchestratorError, Result};
use crate::metrics::METRICS;
use crate::prompt::{PromptCleaner, PromptSanitizer};
use crate::tokenizer::{RemoteTokenizer, Tokenizer};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Collaborators of the orchestrator
pub struct Components {
    pub auth: Arc<dyn TokenProvider>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub sanitizer: Arc<dyn PromptCleaner>,
    pub context: Arc<dyn ContextStore>,
    pub api: Arc<dyn CompletionApi>,
}

/// Completion orchestrator
pub struct CompletionOrchestrator {
    components: Components,
    system_prompt: String,
    model_uri: String,
    temperature: f32,
    max_tokens: u32,
    async_mode: bool,
    schedule: PollSchedule,
    system_tokens: OnceCell<u64>,
}

impl CompletionOrchestrator {
    /// Create an orchestrator over the given components
    pub fn new(components: Components, config: &Config) -> Self {
        Self {
            components,
            system_prompt: config.system_prompt.clone(),
            model_uri: config.completion.model_uri(),
            temperature: config.completion.temperature,
            max_tokens: config.completion.max_tokens,
            async_mode: config.completion.async_mode,
            schedule: PollSchedule::new(config.completion.poll_interval(), config.completion.async_timeout()),
            system_tokens: OnceCell::new(),
        }
    }

    /// Wire the production components: IAM auth, remote tokenizer, the
    /// configured cache backend and the HTTP completion client
    pub async fn from_config(config: &Config, key: &ServiceAccountKey) -> Result<Self> {
        let signer = Arc::new(ServiceAccountSigner::new(key)?);
        let auth = Arc::new(AuthManager::new(&config.auth, signer)?);
        let tokenizer = Arc::new(RemoteTokenizer::new(&config.completion)?);

        let cache: Arc<dyn Cache> = match config.cache.backend {
            CacheBackend::Redis => {
                info!("Using Redis context cache at {}", config.cache.redis_url);
                Arc::new(RedisCache::connect(&config.cache.redis_url).await?)
            }
            CacheBackend::Memory => {
                info!("Using in-memory context cache ({} entries)", config.cache.memory_capacity);
                Arc::new(MemoryCache::new(config.cache.memory_capacity))
            }
        };
        let context = CacheContextStore::new(cache, &config.context)
            .map_err(|e| OrchestratorError::Configuration(e.to_string()))?;

        let api = Arc::new(HttpCompletionApi::new(&config.completion)?);

        Ok(Self::new(
            Components {
                auth,
                tokenizer,
                sanitizer: Arc::new(PromptSanitizer::new()),
                context: Arc::new(context),
                api,
            },
            config,
        ))
    }

    /// Obtain a token and count the system prompt ahead of the first message
    pub async fn initialize(&self) -> Result<()> {
        let token = self.components.auth.get_token().await?;
        self.system_tokens(&token).await?;
        Ok(())
    }

    /// Forget a session's history
    pub async fn reset(&self, session_id: &str) {
        self.components.context.clear(session_id).await;
        info!("Context cleared for session {}", session_id);
    }

    /// Token count of the system prompt, computed once per process
    async fn system_tokens(&self, token: &SecretString) -> Result<u64> {
        let tokens = self
            .system_tokens
            .get_or_try_init(|| async {
                let count = self.components.tokenizer.tokenize(&self.system_prompt, token).await?;
                info!("System prompt is {} tokens", count);
                Ok::<_, OrchestratorError>(count)
            })
            .await?;
        Ok(*tokens)
    }

    /// Answer `prompt` within the conversation identified by `session_id`
    pub async fn get_answer(&self, prompt: &str, session_id: &str) -> Result<String> {
        let mode = if self.async_mode { "async" } else { "sync" };
        let start = Instant::now();

        let result = self.answer(prompt, session_id).await;

        match &result {
            Err(OrchestratorError::EmptyPrompt) => {}
            Ok(_) => METRICS.record_completion(mode, true, start.elapsed().as_secs_f64()),
            Err(e) => {
                warn!("Completion failed for session {}: {}", session_id, e);
                METRICS.record_completion(mode, false, start.elapsed().as_secs_f64());
            }
        }

        result
    }

    async fn answer(&self, prompt: &str, session_id: &str) -> Result<String> {
        let token = self.components.auth.get_token().await?;

        let cleaned = match self.components.sanitizer.clean(prompt) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                METRICS.prompts_rejected.inc();
                debug!("Rejected prompt for session {}: {}", session_id, e);
                return Err(e.into());
            }
        };

        let system_tokens = self.system_tokens(&token).await?;
        let user_tokens = self.components.tokenizer.tokenize(&cleaned, &token).await?;

        let context = self
            .components
            .context
            .update(session_id, Turn::user(cleaned, user_tokens))
            .await;

        let request = CompletionRequest::new(
            self.model_uri.as_str(),
            self.temperature,
            self.max_tokens,
            &self.system_prompt,
            &context,
        );
        let request_tokens = system_tokens.saturating_add(total_tokens(&context));
        METRICS.request_tokens.observe(request_tokens as f64);
        debug!(
            "Session {}: sending {} context turns, {} tokens with the system prompt",
            session_id,
            context.len(),
            request_tokens
        );

        let dispatched = if self.async_mode {
            self.dispatch_async(&request, &token).await
        } else {
            self.components.api.complete(&request, &token).await
        };

        let result = match dispatched {
            Ok(result) => result,
            Err(e) => {
                if let OrchestratorError::InvalidResponse { status: Some(401), .. } = e {
                    warn!("Completion API rejected the bearer token, dropping cached credential");
                    self.components.auth.invalidate().await;
                }
                return Err(e);
            }
        };

        debug!(
            "Usage: {} input, {} completion, {} total tokens (model {})",
            result.usage.input_text_tokens,
            result.usage.completion_tokens,
            result.usage.total_tokens,
            result.model_version.as_deref().unwrap_or("unknown")
        );

        let (text, completion_tokens) = result
            .answer()
            .ok_or_else(|| OrchestratorError::malformed("response has no alternatives"))?;
        let text = text.to_string();

        self.components
            .context
            .update(session_id, Turn::assistant(text.clone(), completion_tokens))
            .await;

        Ok(text)
    }

    /// Start an async operation and poll it until done
    async fn dispatch_async(&self, request: &CompletionRequest, token: &SecretString) -> Result<CompletionResult> {
        let operation_id = self.components.api.complete_async(request, token).await?;
        info!("Started completion operation {}", operation_id);

        let id = operation_id.as_str();
        let outcome = poll_until(self.schedule, |attempt| self.poll_operation(id, token, attempt)).await;

        match outcome {
            Ok(result) => Ok(result),
            Err(PollError::Failed(e)) => Err(e),
            Err(PollError::TimedOut { timeout }) => Err(OrchestratorError::RequestTimeout {
                operation_id: Some(operation_id.clone()),
                message: format!("operation not done within {:?}", timeout),
            }),
        }
    }

    /// One status check; `None` while the operation is still running
    async fn poll_operation(
        &self,
        operation_id: &str,
        token: &SecretString,
        attempt: u32,
    ) -> Result<Option<CompletionResult>> {
        METRICS.operation_polls.inc();
        let status = self.components.api.operation(operation_id, token).await?;
        debug!("Operation {} poll {}: done={}", operation_id, attempt, status.done);

        if !status.done {
            return Ok(None);
        }
        if let Some(error) = status.error {
            return Err(OrchestratorError::InvalidResponse {
                status: None,
                body: format!(
                    "operation {} failed with code {}: {}",
                    operation_id, error.code, error.message
                ),
            });
        }
        status.response.map(Some).ok_or_else(|| {
            OrchestratorError::malformed(format!("operation {} finished without a response", operation_id))
        })
    }
}
