//! Eir - AI inference gateway with a degrading cache and telemetry
//!
//! This crate turns a list of unreliable, rate-limited text-generation
//! services into one dependable call, and carries the supporting pieces a
//! service needs around it:
//!
//! - [`Gateway`] walks providers in a fixed order, skips those whose
//!   availability breaker is tripped and returns the first success,
//!   optionally memoized in the cache
//! - [`CacheStore`] is a key/value cache on Redis that silently falls back
//!   to a bounded in-process map when Redis is unreachable
//! - [`TelemetryCollector`] keeps timing samples and turns them into a
//!   [`PerformanceSummary`] with recommendations
//!
//! # Completion Example
//!
//! ```rust,no_run
//! use eir::{CompletionOptions, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> eir::Result<()> {
//!     let gateway = Gateway::builder()
//!         .huggingface(std::env::var("HF_API_KEY").ok())
//!         .groq(std::env::var("GROQ_API_KEY").ok())
//!         .deepseek(std::env::var("DEEPSEEK_API_KEY").ok())
//!         .build()
//!         .await?;
//!
//!     let text = gateway
//!         .generate_completion(
//!             "You are a helpful health assistant.",
//!             "Explain what an HbA1c test measures.",
//!             &CompletionOptions::default(),
//!         )
//!         .await?;
//!
//!     println!("{text}");
//!     Ok(())
//! }
//! ```
//!
//! # Cache Example
//!
//! ```rust
//! use std::time::Duration;
//! use eir::CacheStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = CacheStore::in_memory();
//! let key = eir::cache::key(&["user", "42", "data"]);
//! let profile = cache
//!     .get_or_compute(&key, Duration::from_secs(300), || async { "Ann".to_string() })
//!     .await;
//! assert_eq!(profile, "Ann");
//! assert_eq!(cache.stats().misses, 1);
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod telemetry;
pub mod version;

// Re-export main types at crate root
pub use cache::{BackendKind, CacheConfig, CacheStats, CacheStore, KeyStats};
pub use config::{Config, Secrets};
pub use error::{EirError, ProviderFailure, Result, TripReason};
pub use gateway::{
    BreakerConfig, BreakerRegistry, BreakerState, CompletionOptions, Gateway, GatewayBuilder,
    Orchestrator, OrchestratorConfig, ProviderDescriptor,
};
pub use providers::{AccessStatus, GenerateRequest, Generation, TextProvider};
pub use telemetry::{PerformanceSummary, TelemetryCollector, TelemetryConfig};
pub use version::{GIT_SHA, PKG_VERSION, version_string};
