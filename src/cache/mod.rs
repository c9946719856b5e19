//! Key/value cache with a Redis primary and an in-process fallback.
//!
//! [`CacheStore`] is the only type most callers touch. It talks to a remote
//! [`CacheBackend`] (Redis, behind the `redis` feature) while that backend is
//! healthy and to a bounded [`MemoryBackend`] otherwise; see its docs for the
//! degradation rules.
//!
//! # Key conventions
//!
//! Keys are colon-delimited namespaces, e.g. `user:<id>:data`,
//! `ai_response:<hash>` or `query:<hash>`. Use [`key()`] to build them.
//! [`CacheStore::delete_pattern`] takes Redis `KEYS` globs over that layout.

mod backend;
pub mod codec;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod stats;
mod store;

use std::time::Duration;

pub use backend::{BackendKind, CacheBackend};
pub use memory::{DEFAULT_MAX_ENTRIES, MemoryBackend, key_matches};
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
pub use stats::{CacheStats, KeyStats};
pub use store::CacheStore;

/// Configuration for a [`CacheStore`].
///
/// ```rust
/// # use eir::CacheConfig;
/// let config = CacheConfig::new()
///     .max_entries(5_000)
///     .redis_url("redis://localhost:6379/0");
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity of the in-process backend. Default: 1,000.
    pub max_entries: usize,
    /// Remote backend URL. Default: none (in-process only).
    pub redis_url: Option<String>,
    /// Upper bound on each remote command, including the initial connect.
    /// Default: 2 seconds.
    pub op_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            redis_url: None,
            op_timeout: Duration::from_secs(2),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }
}

/// Join key segments with `:`.
///
/// ```rust
/// assert_eq!(eir::cache::key(&["user", "42", "data"]), "user:42:data");
/// ```
pub fn key<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.push_str(part.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_segments() {
        assert_eq!(key(&["query", "abc"]), "query:abc");
        assert_eq!(key::<&str>(&[]), "");
        assert_eq!(key(&[String::from("single")]), "single");
    }
}
