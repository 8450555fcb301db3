//! Per-session context persisted in a TTL cache

use super::models::{checked_total_tokens, Turn};
use super::window::{SlidingWindow, WindowConfig, WindowError};
use crate::cache::Cache;
use crate::config::ContextConfig;
use crate::metrics::METRICS;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

/// Session history storage
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Stored turns, oldest first. Empty when absent, expired, corrupt or unreachable.
    async fn get(&self, session_id: &str) -> Vec<Turn>;

    /// Admit `new_turn` into the session window and persist it
    async fn update(&self, session_id: &str, new_turn: Turn) -> Vec<Turn>;

    /// Forget the session
    async fn clear(&self, session_id: &str);
}

/// A session's entry in the lock map; removed on drop once nobody else
/// holds or waits on it, including when the owning future is cancelled
struct SessionLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    session_id: &'a str,
    mutex: Arc<Mutex<()>>,
}

impl<'a> SessionLock<'a> {
    fn register(locks: &'a DashMap<String, Arc<Mutex<()>>>, session_id: &'a str) -> Self {
        let mutex = locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self {
            locks,
            session_id,
            mutex,
        }
    }

    async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().await
    }
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        // The map and this registration are the only owners left
        self.locks.remove_if(self.session_id, |_, lock| {
            Arc::ptr_eq(lock, &self.mutex) && Arc::strong_count(lock) == 2
        });
    }
}

/// Context store backed by any [`Cache`]
pub struct CacheContextStore {
    cache: Arc<dyn Cache>,
    window: SlidingWindow,
    ttl: Duration,
    key_prefix: String,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CacheContextStore {
    /// Create a new store
    pub fn new(cache: Arc<dyn Cache>, config: &ContextConfig) -> Result<Self, WindowError> {
        let window = SlidingWindow::new(WindowConfig {
            max_context_messages: config.max_context_messages,
            max_tokens: config.max_tokens,
        })?;

        Ok(Self {
            cache,
            window,
            ttl: config.ttl(),
            key_prefix: config.key_prefix.clone(),
            session_locks: DashMap::new(),
        })
    }

    /// Cache key of a session, `context:<session_id>` by default
    pub fn key(&self, session_id: &str) -> String {
        format!("{}:{}", self.key_prefix, session_id)
    }

    async fn load(&self, session_id: &str) -> Vec<Turn> {
        let key = self.key(session_id);
        let raw = match self.cache.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Context read failed for session {}, using empty context: {}", session_id, e);
                METRICS.record_cache_failure("get");
                return Vec::new();
            }
        };

        debug!("Context for session {}: {}", session_id, raw);

        match serde_json::from_str::<Vec<Turn>>(&raw) {
            Ok(turns) if checked_total_tokens(&turns).is_none() => {
                error!("Context for session {} has an overflowing token total, discarding it", session_id);
                Vec::new()
            }
            Ok(turns) => turns,
            Err(e) => {
                error!("Failed to deserialize context for session {}: {}", session_id, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ContextStore for CacheContextStore {
    async fn get(&self, session_id: &str) -> Vec<Turn> {
        self.load(session_id).await
    }

    async fn update(&self, session_id: &str, new_turn: Turn) -> Vec<Turn> {
        let lock = SessionLock::register(&self.session_locks, session_id);
        let _guard = lock.acquire().await;

        let existing = self.load(session_id).await;
        let admission = self.window.admit(existing, new_turn);

        METRICS.record_evictions("count", admission.evicted_by_count);
        METRICS.record_evictions("tokens", admission.evicted_by_tokens);
        debug!(
            "Session {}: {} turns, {} tokens, evicted {} by count and {} by tokens",
            session_id,
            admission.turns.len(),
            admission.total_tokens,
            admission.evicted_by_count,
            admission.evicted_by_tokens
        );

        match serde_json::to_string(&admission.turns) {
            Ok(serialized) => {
                if let Err(e) = self.cache.set(&self.key(session_id), &serialized, self.ttl).await {
                    warn!("Context write failed for session {}, history not persisted: {}", session_id, e);
                    METRICS.record_cache_failure("set");
                } else {
                    debug!("Context for session {} updated", session_id);
                }
            }
            Err(e) => error!("Failed to serialize context for session {}: {}", session_id, e),
        }

        admission.turns
    }

    async fn clear(&self, session_id: &str) {
        if let Err(e) = self.cache.delete(&self.key(session_id)).await {
            warn!("Failed to clear context for session {}: {}", session_id, e);
            METRICS.record_cache_failure("delete");
        }
    }
}
