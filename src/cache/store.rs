//! The dual-backend cache store.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use super::backend::{BackendKind, CacheBackend};
use super::memory::MemoryBackend;
use super::stats::{CacheStats, KeyStats, Outcome, StatsRecorder};
use super::CacheConfig;
use crate::telemetry::{self, TelemetryCollector};
use crate::EirError;

/// Where a call ends up after trying the remote backend.
enum Remote<T> {
    Done(T),
    /// The remote answered with an error; this call fails.
    Rejected,
    /// No active remote, or it just became unreachable.
    Local,
}

/// Key/value cache with a remote primary and an in-process fallback.
///
/// While a remote backend is configured and healthy, every operation goes
/// to it. The first time it is unreachable (at startup or on any call) the
/// failure is logged and counted, and the store switches to the in-process
/// backend for the rest of the process lifetime; the failing operation is
/// then served locally. A command the remote answers with an error (a key
/// of the wrong type, an unreadable value) is counted and fails only that
/// call. None of the methods return an error.
///
/// ```rust
/// # use eir::CacheStore;
/// # use std::time::Duration;
/// # async fn demo() {
/// let cache = CacheStore::in_memory();
/// cache.set("user:42:data", &vec![1, 2, 3], Duration::from_secs(60)).await;
/// let data: Option<Vec<u32>> = cache.get("user:42:data").await;
/// assert_eq!(data, Some(vec![1, 2, 3]));
/// # }
/// ```
pub struct CacheStore {
    remote: Option<Arc<dyn CacheBackend>>,
    local: MemoryBackend,
    degraded: AtomicBool,
    stats: Mutex<StatsRecorder>,
    telemetry: Option<Arc<TelemetryCollector>>,
}

impl CacheStore {
    /// In-process store with default capacity.
    pub fn in_memory() -> Self {
        Self::new(&CacheConfig::default())
    }

    /// In-process store; `config.redis_url` is ignored.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            remote: None,
            local: MemoryBackend::new(config.max_entries),
            degraded: AtomicBool::new(false),
            stats: Mutex::new(StatsRecorder::default()),
            telemetry: None,
        }
    }

    /// Build a store from `config`, connecting to Redis when a URL is set.
    ///
    /// An unreachable server is not an error: the store starts degraded.
    pub async fn connect(config: &CacheConfig) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            return Self::new(config);
        };

        Self::connect_redis(url, config).await
    }

    #[cfg(feature = "redis")]
    async fn connect_redis(url: &str, config: &CacheConfig) -> Self {
        match super::redis::RedisBackend::connect(url, config.op_timeout).await {
            Ok(backend) => Self::with_remote(Arc::new(backend), config).await,
            Err(e) => {
                tracing::warn!(error = %e, "redis unavailable, using in-process cache");
                Self::new(config).degrade_at_startup()
            }
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_redis(url: &str, config: &CacheConfig) -> Self {
        tracing::warn!(
            url = %url,
            "redis url configured but the `redis` feature is disabled, using in-process cache"
        );
        Self::new(config).degrade_at_startup()
    }

    /// Build a store over an arbitrary remote backend.
    ///
    /// The backend is pinged once; on failure the store starts degraded.
    pub async fn with_remote(remote: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        let mut store = Self::new(config);
        match remote.ping().await {
            Ok(()) => {
                store.remote = Some(remote);
                store
            }
            Err(e) => {
                tracing::warn!(
                    backend = %remote.kind(),
                    error = %e,
                    "remote cache ping failed, using in-process cache"
                );
                store.degrade_at_startup()
            }
        }
    }

    /// Report each cache operation to `collector` as a `cache:<op>` sample.
    pub fn with_telemetry(mut self, collector: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(collector);
        self
    }

    fn degrade_at_startup(self) -> Self {
        self.degraded.store(true, Ordering::Relaxed);
        self.count(None, Outcome::Error);
        metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "backend" => BackendKind::Redis.as_str())
            .increment(1);
        self
    }

    /// Remote backend, unless absent or degraded.
    fn active_remote(&self) -> Option<&Arc<dyn CacheBackend>> {
        if self.degraded.load(Ordering::Relaxed) {
            None
        } else {
            self.remote.as_ref()
        }
    }

    /// Count a remote failure and decide where the call goes next.
    fn settle<T>(
        &self,
        remote: &Arc<dyn CacheBackend>,
        op: &str,
        key: Option<&str>,
        result: crate::Result<T>,
    ) -> Remote<T> {
        let err = match result {
            Ok(value) => return Remote::Done(value),
            Err(err) => err,
        };
        self.count(key, Outcome::Error);
        metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "backend" => remote.kind().as_str())
            .increment(1);

        if !matches!(err, EirError::CacheBackend(_)) {
            tracing::warn!(backend = %remote.kind(), op, key, error = %err, "remote cache rejected command");
            return Remote::Rejected;
        }
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                backend = %remote.kind(),
                op,
                error = %err,
                "remote cache unreachable, falling back to in-process cache"
            );
        }
        Remote::Local
    }

    fn count(&self, key: Option<&str>, outcome: Outcome) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.record(key, outcome);
    }

    fn observe(&self, op: &str, start: Instant) {
        if let Some(ref collector) = self.telemetry {
            let metadata = BTreeMap::from([(
                "backend".to_string(),
                self.backend_kind().as_str().to_string(),
            )]);
            collector.record(
                format!("cache:{op}"),
                start.elapsed().as_secs_f64(),
                metadata,
            );
        }
    }

    async fn get_value(&self, key: &str) -> Option<Value> {
        let served = match self.active_remote() {
            Some(remote) => {
                let result = remote.get(key).await;
                self.settle(remote, "get", Some(key), result)
            }
            None => Remote::Local,
        };
        match served {
            Remote::Done(value) => value,
            Remote::Rejected => None,
            Remote::Local => self.local.get_value(key),
        }
    }

    /// Fetch and deserialize a live value.
    ///
    /// A value that does not deserialize as `T` counts as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let start = Instant::now();
        let value = self.get_value(key).await.and_then(|v| {
            serde_json::from_value(v)
                .inspect_err(|e| tracing::debug!(key, error = %e, "cached value has wrong shape"))
                .ok()
        });

        let backend = self.backend_kind().as_str();
        if value.is_some() {
            self.count(Some(key), Outcome::Hit);
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "backend" => backend).increment(1);
        } else {
            self.count(Some(key), Outcome::Miss);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "backend" => backend).increment(1);
        }
        self.observe("get", start);
        value
    }

    /// Store `value` under `key` for `ttl`. A zero `ttl` removes the key.
    ///
    /// Returns false when the value cannot be serialized or the remote
    /// backend rejects the write.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let start = Instant::now();
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "value is not serializable, not cached");
                return false;
            }
        };

        let served = match self.active_remote() {
            Some(remote) => {
                let result = remote.set(key, value.clone(), ttl).await;
                self.settle(remote, "set", Some(key), result)
            }
            None => Remote::Local,
        };
        let stored = match served {
            Remote::Done(()) => true,
            Remote::Rejected => false,
            Remote::Local => {
                self.local.set_value(key, value, ttl);
                true
            }
        };

        self.count(Some(key), Outcome::Op);
        self.observe("set", start);
        stored
    }

    /// Remove `key`; returns whether a live entry existed.
    pub async fn delete(&self, key: &str) -> bool {
        let start = Instant::now();
        let served = match self.active_remote() {
            Some(remote) => {
                let result = remote.delete(key).await;
                self.settle(remote, "delete", Some(key), result)
            }
            None => Remote::Local,
        };
        let removed = match served {
            Remote::Done(removed) => removed,
            Remote::Rejected => false,
            Remote::Local => self.local.delete_key(key),
        };

        self.count(Some(key), Outcome::Op);
        self.observe("delete", start);
        removed
    }

    /// Whether a live entry exists for `key`.
    ///
    /// Counted in `operations`, not in `hits` or `misses`, so it leaves the
    /// hit ratio unchanged.
    pub async fn exists(&self, key: &str) -> bool {
        let start = Instant::now();
        let served = match self.active_remote() {
            Some(remote) => {
                let result = remote.exists(key).await;
                self.settle(remote, "exists", Some(key), result)
            }
            None => Remote::Local,
        };
        let found = match served {
            Remote::Done(found) => found,
            Remote::Rejected => false,
            Remote::Local => self.local.contains(key),
        };

        self.count(Some(key), Outcome::Op);
        self.observe("exists", start);
        found
    }

    /// Delete every key matching a Redis `KEYS` pattern (`*`, `?`, `[...]`,
    /// `[^...]`, `\` escapes). The in-process backend matches with
    /// [`key_matches`](super::key_matches), so both backends remove the same keys.
    ///
    /// Returns the number of keys removed.
    pub async fn delete_pattern(&self, pattern: &str) -> usize {
        let start = Instant::now();
        let served = match self.active_remote() {
            Some(remote) => {
                let result = remote.delete_pattern(pattern).await;
                self.settle(remote, "delete_pattern", None, result)
            }
            None => Remote::Local,
        };
        let removed = match served {
            Remote::Done(removed) => removed,
            Remote::Rejected => 0,
            Remote::Local => self.local.delete_matching(pattern),
        };

        tracing::debug!(pattern, removed, "deleted keys by pattern");
        self.observe("delete_pattern", start);
        removed
    }

    /// Return the cached value for `key`, or run `producer`, cache its
    /// result for `ttl` and return it.
    ///
    /// Not exclusive: concurrent callers that miss on the same key each run
    /// `producer`, and the last write wins.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(value) = self.get(key).await {
            return value;
        }
        let value = producer().await;
        self.set(key, &value, ttl).await;
        value
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for fallible producers.
    /// Errors are returned to the caller and nothing is cached.
    pub async fn get_or_try_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }
        let value = producer().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Remove every entry and reset all statistics.
    ///
    /// Returns false when the remote backend rejects the flush; its entries
    /// and the statistics are then left as they were.
    pub async fn clear(&self) -> bool {
        let start = Instant::now();
        if let Some(remote) = self.active_remote() {
            let result = remote.clear().await;
            if let Remote::Rejected = self.settle(remote, "clear", None, result) {
                self.observe("clear", start);
                return false;
            }
        }
        self.local.clear_all();
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.observe("clear", start);
        true
    }

    /// Number of stored entries in the serving backend.
    pub async fn len(&self) -> usize {
        let served = match self.active_remote() {
            Some(remote) => {
                let result = remote.len().await;
                self.settle(remote, "len", None, result)
            }
            None => Remote::Local,
        };
        match served {
            Remote::Done(n) => n,
            Remote::Rejected => 0,
            Remote::Local => self.local.entry_count(),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(self.backend_kind(), self.is_degraded())
    }

    pub fn key_stats(&self, key: &str) -> Option<KeyStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .key(key)
    }

    /// Backend currently serving requests.
    pub fn backend_kind(&self) -> BackendKind {
        match self.active_remote() {
            Some(remote) => remote.kind(),
            None => BackendKind::Memory,
        }
    }

    /// Whether a remote backend was configured and has been abandoned.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend_kind())
            .field("degraded", &self.is_degraded())
            .field("max_entries", &self.local.max_entries())
            .finish()
    }
}
