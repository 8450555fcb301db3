//! TTL key-value cache backing the session context store

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store with seconds-granularity expiry
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value that expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Reset the expiry of an existing key; `false` if the key is absent
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Remove a key; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
