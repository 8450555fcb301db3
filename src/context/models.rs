//! Data models for session context

use serde::{Deserialize, Serialize};

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a conversation with its token cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub tokens: u64,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>, tokens: u64) -> Self {
        Self {
            role,
            text: text.into(),
            tokens,
        }
    }

    pub fn user(text: impl Into<String>, tokens: u64) -> Self {
        Self::new(Role::User, text, tokens)
    }

    pub fn assistant(text: impl Into<String>, tokens: u64) -> Self {
        Self::new(Role::Assistant, text, tokens)
    }
}

/// Sum of token costs of a sequence of turns, saturating at `u64::MAX`
pub fn total_tokens(turns: &[Turn]) -> u64 {
    turns.iter().map(|t| t.tokens).fold(0, u64::saturating_add)
}

/// Sum of token costs, `None` on overflow
pub fn checked_total_tokens(turns: &[Turn]) -> Option<u64> {
    turns.iter().try_fold(0u64, |total, t| total.checked_add(t.tokens))
}
