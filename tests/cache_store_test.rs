//! Integration tests for the dual-backend cache store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use eir::cache::{self, BackendKind, CacheBackend, MemoryBackend};
use eir::{CacheConfig, CacheStore, EirError, Result, TelemetryCollector};

// ============================================================================
// Remote backend stubs
// ============================================================================

/// Remote backend that drops the connection once `broken` is set and
/// answers with a command error while `rejecting` is set.
struct FlakyRemote {
    inner: MemoryBackend,
    broken: AtomicBool,
    rejecting: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyRemote {
    fn healthy() -> Self {
        Self {
            inner: MemoryBackend::new(100),
            broken: AtomicBool::new(false),
            rejecting: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            Err(EirError::CacheBackend("connection reset by peer".into()))
        } else if self.rejecting.load(Ordering::SeqCst) {
            Err(EirError::CacheCommand(
                "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for FlakyRemote {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        self.check()?;
        self.inner.delete_pattern(pattern).await
    }

    async fn len(&self) -> Result<usize> {
        self.check()?;
        self.inner.len().await
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        self.inner.clear().await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    age: u32,
}

const MINUTE: Duration = Duration::from_secs(60);

// ============================================================================
// Basic operations
// ============================================================================

#[tokio::test]
async fn structured_value_round_trips() {
    let store = CacheStore::in_memory();
    let profile = Profile {
        name: "Ann".into(),
        age: 34,
    };

    assert!(store.set("user:42:data", &profile, MINUTE).await);
    let back: Option<Profile> = store.get("user:42:data").await;
    assert_eq!(back, Some(profile));
}

#[tokio::test]
async fn missing_key_is_a_miss() {
    let store = CacheStore::in_memory();
    let value: Option<String> = store.get("nope").await;
    assert!(value.is_none());

    let stats = store.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn wrong_shape_counts_as_miss() {
    let store = CacheStore::in_memory();
    store.set("k", "text", MINUTE).await;
    let value: Option<u64> = store.get("k").await;
    assert!(value.is_none());
    assert_eq!(store.stats().misses, 1);
}

#[tokio::test]
async fn delete_and_exists() {
    let store = CacheStore::in_memory();
    store.set("k", &1, MINUTE).await;
    assert!(store.exists("k").await);
    assert!(store.delete("k").await);
    assert!(!store.exists("k").await);
    assert!(!store.delete("k").await);
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_ttl() {
    let store = CacheStore::in_memory();
    store.set("session", "abc", Duration::from_secs(2)).await;

    tokio::time::advance(Duration::from_millis(1_900)).await;
    assert_eq!(store.get::<String>("session").await.as_deref(), Some("abc"));

    tokio::time::advance(Duration::from_millis(200)).await;
    assert_eq!(store.get::<String>("session").await, None);
    assert!(!store.exists("session").await);
}

#[tokio::test(start_paused = true)]
async fn oldest_entry_is_evicted_at_capacity() {
    let store = CacheStore::new(&CacheConfig::new().max_entries(3));
    for key in ["a", "b", "c"] {
        store.set(key, &key, MINUTE).await;
        tokio::time::advance(Duration::from_millis(10)).await;
    }

    // Reading "a" does not protect it; eviction is by creation time.
    assert!(store.get::<String>("a").await.is_some());
    store.set("d", &"d", MINUTE).await;

    assert_eq!(store.len().await, 3);
    assert!(!store.exists("a").await);
    for key in ["b", "c", "d"] {
        assert!(store.exists(key).await, "{key} should survive");
    }
}

#[tokio::test]
async fn delete_pattern_removes_matching_keys_only() {
    let store = CacheStore::in_memory();
    store.set("user:42:data", &1, MINUTE).await;
    store.set("user:42:prefs", &2, MINUTE).await;
    store.set("user:43:data", &3, MINUTE).await;
    store.set("query:abc", &4, MINUTE).await;

    assert_eq!(store.delete_pattern("user:42:*").await, 2);
    assert!(!store.exists("user:42:data").await);
    assert!(store.exists("user:43:data").await);
    assert!(store.exists("query:abc").await);
}

#[tokio::test]
async fn negated_class_follows_redis() {
    let store = CacheStore::in_memory();
    for key in ["user:42:data", "user:5:data", "user:^x"] {
        store.set(key, &true, MINUTE).await;
    }

    // `[^4]` is "any byte but 4", which includes a literal caret.
    assert_eq!(store.delete_pattern("user:[^4]*").await, 2);
    assert!(store.exists("user:42:data").await);
    assert!(!store.exists("user:5:data").await);
    assert!(!store.exists("user:^x").await);
}

#[tokio::test]
async fn repeated_stars_and_escapes_match() {
    let store = CacheStore::in_memory();
    for key in ["user:42:data", "user:42:prefs", "user:*", "users"] {
        store.set(key, &true, MINUTE).await;
    }

    assert_eq!(store.delete_pattern("user:42:**").await, 2);
    assert_eq!(store.delete_pattern(r"user:\*").await, 1);
    assert!(store.exists("users").await);
}

#[tokio::test]
async fn unterminated_class_is_not_an_error() {
    let store = CacheStore::in_memory();
    store.set("user:1", &1, MINUTE).await;
    store.set("user:2", &2, MINUTE).await;
    assert_eq!(store.delete_pattern("user:[1").await, 1);
    assert!(store.exists("user:2").await);
}

#[tokio::test]
async fn pattern_goes_to_remote_unchanged() {
    let remote = Arc::new(FlakyRemote::healthy());
    let store = CacheStore::with_remote(remote.clone(), &CacheConfig::default()).await;
    store.set("user:42:data", &1, MINUTE).await;
    store.set("user:5:data", &2, MINUTE).await;

    assert_eq!(store.delete_pattern("user:[^4]**").await, 1);
    assert!(!store.is_degraded());
    assert_eq!(remote.inner.len().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_removes_the_key() {
    let store = CacheStore::in_memory();
    store.set("k", &1, MINUTE).await;
    assert!(store.set("k", &2, Duration::ZERO).await);
    assert_eq!(store.get::<u32>("k").await, None);
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn exists_counts_as_an_operation_only() {
    let store = CacheStore::in_memory();
    store.set("k", &1, MINUTE).await;
    store.exists("k").await;
    store.exists("missing").await;

    let stats = store.stats();
    assert_eq!((stats.hits, stats.misses), (0, 0));
    assert_eq!(stats.operations, 3);
    assert_eq!(store.key_stats("k").unwrap().operations, 2);
}

#[tokio::test]
async fn hit_ratio_and_per_key_stats() {
    let store = CacheStore::in_memory();
    store.set("hot", &1, MINUTE).await;
    for _ in 0..3 {
        store.get::<u32>("hot").await;
    }
    store.get::<u32>("cold").await;

    let stats = store.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_ratio - 0.75).abs() < 1e-9);
    assert_eq!(stats.backend, BackendKind::Memory);
    assert!(!stats.degraded);

    let hot = store.key_stats("hot").unwrap();
    assert_eq!(hot.hits, 3);
    assert_eq!(hot.misses, 0);
    assert_eq!(store.key_stats("cold").unwrap().misses, 1);
}

#[tokio::test]
async fn clear_empties_store_and_resets_stats() {
    let store = CacheStore::in_memory();
    store.set("a", &1, MINUTE).await;
    store.get::<u32>("a").await;

    assert!(store.clear().await);
    assert!(store.is_empty().await);
    let stats = store.stats();
    assert_eq!(stats.hits + stats.misses, 0);
    assert_eq!(stats.hit_ratio, 0.0);
}

// ============================================================================
// get_or_compute
// ============================================================================

#[tokio::test]
async fn get_or_compute_runs_producer_once() {
    let store = CacheStore::in_memory();
    let runs = AtomicUsize::new(0);
    let key = cache::key(&["user", "7", "data"]);

    for _ in 0..3 {
        let value = store
            .get_or_compute(&key, MINUTE, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                vec![1u32, 2, 3]
            })
            .await;
        assert_eq!(value, vec![1, 2, 3]);
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let stats = store.stats();
    assert_eq!((stats.hits, stats.misses), (2, 1));
}

#[tokio::test]
async fn get_or_try_compute_does_not_cache_errors() {
    let store = CacheStore::in_memory();

    let err: std::result::Result<u32, &str> = store
        .get_or_try_compute("k", MINUTE, || async { Err("db down") })
        .await;
    assert_eq!(err, Err("db down"));
    assert!(!store.exists("k").await);

    let ok: std::result::Result<u32, &str> =
        store.get_or_try_compute("k", MINUTE, || async { Ok(9) }).await;
    assert_eq!(ok, Ok(9));
    assert_eq!(store.get::<u32>("k").await, Some(9));
}

// ============================================================================
// Degradation
// ============================================================================

#[tokio::test]
async fn healthy_remote_serves_requests() {
    let remote = Arc::new(FlakyRemote::healthy());
    let store = CacheStore::with_remote(remote.clone(), &CacheConfig::default()).await;

    assert_eq!(store.backend_kind(), BackendKind::Redis);
    store.set("k", &"v", MINUTE).await;
    assert_eq!(remote.inner.len().await.unwrap(), 1);
    assert_eq!(store.get::<String>("k").await.as_deref(), Some("v"));
}

#[tokio::test]
async fn unreachable_remote_at_startup_degrades() {
    let remote = Arc::new(FlakyRemote::healthy());
    remote.broken.store(true, Ordering::SeqCst);

    let store = CacheStore::with_remote(remote.clone(), &CacheConfig::default()).await;
    assert!(store.is_degraded());
    assert_eq!(store.backend_kind(), BackendKind::Memory);

    store.set("k", &1, MINUTE).await;
    assert_eq!(store.get::<u32>("k").await, Some(1));
    // Only the startup ping reached the remote.
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.stats().errors, 1);
}

#[tokio::test]
async fn rejected_command_fails_only_that_call() {
    let remote = Arc::new(FlakyRemote::healthy());
    let store = CacheStore::with_remote(remote.clone(), &CacheConfig::default()).await;
    store.set("shared", &"kept", MINUTE).await;

    remote.rejecting.store(true, Ordering::SeqCst);
    assert_eq!(store.get::<String>("other-app:hash").await, None);
    assert!(!store.set("other-app:hash", &1, MINUTE).await);

    // The store keeps using the remote backend.
    assert!(!store.is_degraded());
    assert_eq!(store.backend_kind(), BackendKind::Redis);

    remote.rejecting.store(false, Ordering::SeqCst);
    assert_eq!(store.get::<String>("shared").await.as_deref(), Some("kept"));

    let stats = store.stats();
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn rejected_clear_keeps_statistics() {
    let remote = Arc::new(FlakyRemote::healthy());
    let store = CacheStore::with_remote(remote.clone(), &CacheConfig::default()).await;
    store.set("k", &1, MINUTE).await;

    remote.rejecting.store(true, Ordering::SeqCst);
    assert!(!store.clear().await);
    assert_eq!(store.delete_pattern("*").await, 0);
    assert!(!store.is_degraded());

    remote.rejecting.store(false, Ordering::SeqCst);
    assert_eq!(remote.inner.len().await.unwrap(), 1);
    assert_eq!(store.stats().errors, 2);
}

#[tokio::test]
async fn remote_failure_mid_flight_falls_back_transparently() {
    let remote = Arc::new(FlakyRemote::healthy());
    let store = CacheStore::with_remote(remote.clone(), &CacheConfig::default()).await;
    assert!(!store.is_degraded());

    remote.broken.store(true, Ordering::SeqCst);

    // The failing call itself is served locally.
    assert!(store.set("user:1:data", &"Ann", MINUTE).await);
    assert!(store.is_degraded());
    assert_eq!(store.get::<String>("user:1:data").await.as_deref(), Some("Ann"));

    // The remote is not consulted again, even once it recovers.
    let calls = remote.calls.load(Ordering::SeqCst);
    remote.broken.store(false, Ordering::SeqCst);
    store.get::<String>("user:1:data").await;
    assert_eq!(remote.calls.load(Ordering::SeqCst), calls);

    let stats = store.stats();
    assert_eq!(stats.errors, 1);
    assert!(stats.degraded);
    assert_eq!(stats.backend, BackendKind::Memory);
}

#[tokio::test]
async fn connect_without_url_is_in_memory() {
    let store = CacheStore::connect(&CacheConfig::default()).await;
    assert_eq!(store.backend_kind(), BackendKind::Memory);
    assert!(!store.is_degraded());
}

#[tokio::test]
async fn connect_to_unreachable_redis_degrades() {
    let config = CacheConfig::new()
        .redis_url("redis://127.0.0.1:1/0")
        .op_timeout(Duration::from_millis(500));
    let store = CacheStore::connect(&config).await;

    assert!(store.is_degraded());
    store.set("k", &1, MINUTE).await;
    assert_eq!(store.get::<u32>("k").await, Some(1));
}

// ============================================================================
// Telemetry
// ============================================================================

#[tokio::test]
async fn operations_are_reported_to_collector() {
    let collector = Arc::new(TelemetryCollector::default());
    let store = CacheStore::in_memory().with_telemetry(Arc::clone(&collector));

    store.set("k", &1, MINUTE).await;
    store.get::<u32>("k").await;
    store.get::<u32>("k").await;

    assert_eq!(collector.sample_count("cache:set"), 1);
    assert_eq!(collector.sample_count("cache:get"), 2);
    let sample = &collector.samples("cache:get")[0];
    assert_eq!(sample.metadata.get("backend").map(String::as_str), Some("memory"));
}

// ============================================================================
// Live Redis (requires a local server)
// ============================================================================

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires a Redis server at REDIS_URL or redis://127.0.0.1:6379"]
async fn live_redis_round_trip() {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".into());
    let store = CacheStore::connect(&CacheConfig::new().redis_url(url)).await;
    assert_eq!(store.backend_kind(), BackendKind::Redis);

    store.clear().await;
    store.set("user:42:data", &Profile { name: "Ann".into(), age: 34 }, MINUTE).await;
    store.set("user:42:prefs", "dark", MINUTE).await;
    store.set("user:43:data", &3, MINUTE).await;

    let profile: Option<Profile> = store.get("user:42:data").await;
    assert_eq!(profile.map(|p| p.age), Some(34));
    assert_eq!(store.get::<String>("user:42:prefs").await.as_deref(), Some("dark"));

    assert_eq!(store.delete_pattern("user:42:*").await, 2);
    assert_eq!(store.len().await, 1);
    store.clear().await;
    assert!(!store.is_degraded());
}
