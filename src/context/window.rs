//! Sliding-window eviction for session context
//!
//! Both caps are enforced on every admission, oldest turn first,
//! regardless of role:
//! - message count: trimmed *before* the new turn is added
//! - token budget: trimmed while `existing + new >= max_tokens`
//!
//! The new turn itself is never evicted, so a single oversized turn
//! survives on its own.

use super::models::Turn;
use std::collections::VecDeque;
use thiserror::Error;

/// Window configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub max_context_messages: usize,
    pub max_tokens: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_context_messages: 5,
            max_tokens: 7500,
        }
    }
}

impl WindowConfig {
    /// Validate that both caps can hold at least one turn
    pub fn validate(&self) -> Result<(), WindowError> {
        if self.max_context_messages == 0 {
            return Err(WindowError::ConfigurationInvalid(
                "max_context_messages must be greater than zero".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(WindowError::ConfigurationInvalid(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Window errors
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),
}

/// Outcome of admitting a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Window after eviction, oldest first, ending with the admitted turn
    pub turns: Vec<Turn>,
    pub evicted_by_count: usize,
    pub evicted_by_tokens: usize,
    pub total_tokens: u64,
}

impl Admission {
    pub fn evicted(&self) -> usize {
        self.evicted_by_count + self.evicted_by_tokens
    }
}

/// FIFO window bounded by message count and cumulative tokens
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    config: WindowConfig,
}

impl SlidingWindow {
    /// Create a new window
    pub fn new(config: WindowConfig) -> Result<Self, WindowError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration
    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Evict from `existing` as needed and append `new_turn`
    pub fn admit(&self, existing: Vec<Turn>, new_turn: Turn) -> Admission {
        let mut window: VecDeque<Turn> = existing.into();

        let mut evicted_by_count = 0;
        while window.len() >= self.config.max_context_messages {
            window.pop_front();
            evicted_by_count += 1;
        }

        // Saturates, so an absurd stored count evicts instead of wrapping
        let budget = |turns: &VecDeque<Turn>| {
            turns
                .iter()
                .map(|t| t.tokens)
                .fold(new_turn.tokens, u64::saturating_add)
        };

        let mut total = budget(&window);
        let mut evicted_by_tokens = 0;
        while total >= self.config.max_tokens && window.pop_front().is_some() {
            evicted_by_tokens += 1;
            total = budget(&window);
        }

        window.push_back(new_turn);

        Admission {
            turns: window.into(),
            evicted_by_count,
            evicted_by_tokens,
            total_tokens: total,
        }
    }
}
