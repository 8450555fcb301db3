//! Completion dispatch: wire types, HTTP client, polling and the orchestrator

pub mod client;
pub mod models;
pub mod orchestrator;
pub mod poll;

pub use client::{CompletionApi, HttpCompletionApi};
pub use models::{CompletionRequest, CompletionResult, OperationStatus, Usage};
pub use orchestrator::{CompletionOrchestrator, Components};
pub use poll::{poll_until, PollError, PollSchedule};
