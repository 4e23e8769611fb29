//! # Redis Cache Layer
//!
//! Redis-backed [`CacheStore`]: one Redis hash per record, addressed by the
//! record's cache key (`emp:1`).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use rowcache_domain::{CacheKey, FieldMap};

use super::traits::CacheStore;
use crate::error::Result;

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub url: String,
    /// Expiry applied to every populated entry, at millisecond precision.
    /// `None` or a zero duration keeps entries until evicted.
    pub entry_ttl: Option<Duration>,
    /// Upper bound on a single command round trip
    pub response_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            entry_ttl: None,
            response_timeout: Some(Duration::from_secs(2)),
        }
    }
}

/// Redis cache store with a multiplexed, auto-reconnecting connection
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
    config: CacheConfig,
}

impl RedisCacheStore {
    /// Connect to Redis
    pub async fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;

        let mut manager_config = ConnectionManagerConfig::new();
        if let Some(timeout) = config.response_timeout {
            manager_config = manager_config.set_response_timeout(timeout);
        }
        let conn = ConnectionManager::new_with_config(client, manager_config).await?;

        tracing::debug!(url = %config.url, "Redis connection manager ready");
        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn hash_get(&self, key: &CacheKey) -> Result<Option<FieldMap>> {
        let mut conn = self.conn.clone();

        // HGETALL answers a missing key with an empty hash.
        let entry: FieldMap = conn.hgetall(key.to_string()).await?;

        if entry.is_empty() {
            Ok(None)
        } else {
            Ok(Some(entry))
        }
    }

    async fn hash_set(&self, key: &CacheKey, fields: &FieldMap) -> Result<()> {
        let key = key.to_string();
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        // MULTI/EXEC so the old hash, the new fields and the expiry change
        // together.
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !items.is_empty() {
            pipe.hset_multiple(&key, items.as_slice()).ignore();
        }
        if let Some(millis) = self.config.entry_ttl.and_then(expiry_millis) {
            pipe.pexpire(&key, millis).ignore();
        }

        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key.to_string()).await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<String> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong)
    }
}

/// `PEXPIRE` argument for an entry TTL.
///
/// Redis deletes a key whose timeout is not positive, so sub-millisecond
/// TTLs round up to 1ms and a zero TTL means no expiry at all.
fn expiry_millis(ttl: Duration) -> Option<i64> {
    if ttl.is_zero() {
        return None;
    }
    Some(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1))
}
