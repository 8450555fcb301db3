//! Conversational session orchestrator for hosted LLM completion APIs
//!
//! Front ends call [`CompletionOrchestrator::get_answer`] with a prompt and
//! a session id. The orchestrator keeps a bounded per-session history in a
//! TTL cache, authenticates with short-lived IAM tokens and dispatches
//! synchronous or polled asynchronous completions.

pub mod auth;
pub mod cache;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod prompt;
pub mod tokenizer;

pub use completion::{CompletionOrchestrator, Components};
pub use config::Config;
pub use error::{OrchestratorError, Result};
