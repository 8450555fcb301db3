//! Redis-backed cache

use super::{Cache, CacheError};
use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Redis cache using a reconnecting connection manager
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to `redis://host:port/db`
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        info!("Connected to Redis cache");
        Ok(Self { conn })
    }

    /// Redis expiry is whole seconds; round sub-second TTLs up
    fn ttl_secs(ttl: Duration) -> u64 {
        let secs = ttl.as_secs();
        if ttl.subsec_nanos() > 0 || secs == 0 {
            secs + 1
        } else {
            secs
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, Self::ttl_secs(ttl))
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        debug!("SET {} (ttl {}s)", key, Self::ttl_secs(ttl));
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        conn.expire::<_, bool>(key, Self::ttl_secs(ttl) as i64)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounding() {
        assert_eq!(RedisCache::ttl_secs(Duration::from_secs(3600)), 3600);
        assert_eq!(RedisCache::ttl_secs(Duration::from_millis(1500)), 2);
        assert_eq!(RedisCache::ttl_secs(Duration::from_millis(10)), 1);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server on localhost:6379"]
    async fn test_round_trip_against_local_redis() {
        let cache = RedisCache::connect("redis://127.0.0.1:6379/0").await.unwrap();
        let key = format!("context:test-{}", uuid::Uuid::new_v4());

        cache.set(&key, "[]", Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some("[]".to_string()));
        assert!(cache.expire(&key, Duration::from_secs(10)).await.unwrap());

        cache.delete(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }
}
