//! Remote backend speaking the Redis protocol.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde_json::Value;

use super::backend::{BackendKind, CacheBackend};
use super::codec;
use crate::{EirError, Result};

/// Redis backend over a shared, auto-reconnecting [`ConnectionManager`].
///
/// Every command is bounded by `op_timeout`; a timeout is reported as a
/// backend error so the store degrades instead of stalling callers.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisBackend {
    /// Connect to `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| EirError::CacheBackend(format!("invalid redis url: {e}")))?;
        let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| EirError::CacheBackend("redis connection timed out".into()))??;
        tracing::info!("redis connection established");
        Ok(Self { conn, op_timeout })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(EirError::from),
            Err(_) => Err(EirError::CacheBackend(format!("redis {op} timed out"))),
        }
    }
}

/// PSETEX milliseconds for a non-zero TTL, rounded up.
fn ttl_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_millis() + u128::from(ttl.subsec_nanos() % 1_000_000 > 0);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        self.bounded("PING", redis::cmd("PING").query_async::<()>(&mut conn))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = self
            .bounded("GET", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await?;
        Ok(raw.as_deref().map(codec::decode))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        // Already expired: same outcome as the in-process backend.
        if ttl.is_zero() {
            return self
                .bounded("DEL", redis::cmd("DEL").arg(key).query_async::<()>(&mut conn))
                .await;
        }
        let encoded = codec::encode(&value);
        self.bounded(
            "PSETEX",
            redis::cmd("PSETEX")
                .arg(key)
                .arg(ttl_millis(ttl))
                .arg(encoded)
                .query_async::<()>(&mut conn),
        )
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .bounded("DEL", redis::cmd("DEL").arg(key).query_async(&mut conn))
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let found: u64 = self
            .bounded("EXISTS", redis::cmd("EXISTS").arg(key).query_async(&mut conn))
            .await?;
        Ok(found > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = self
            .bounded("KEYS", redis::cmd("KEYS").arg(pattern).query_async(&mut conn))
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self
            .bounded("DEL", redis::cmd("DEL").arg(&keys).query_async(&mut conn))
            .await?;
        Ok(removed as usize)
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = self
            .bounded("KEYS", redis::cmd("KEYS").arg("*").query_async(&mut conn))
            .await?;
        Ok(keys.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        self.bounded("FLUSHDB", redis::cmd("FLUSHDB").query_async::<()>(&mut conn))
            .await
    }
}
