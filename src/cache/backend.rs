//! Backend abstraction shared by the remote and in-process stores.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Which backend served an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Redis,
    #[default]
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Redis => "redis",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key/value backend with per-entry expiry.
///
/// Values cross this boundary as structured JSON; a backend that needs a
/// wire format encodes them itself (see [`codec`](super::codec)). Errors
/// from a remote backend are treated by [`CacheStore`](super::CacheStore)
/// as connection loss.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Connectivity check used once at startup.
    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete every key matching a Redis-style glob; returns the count removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}
