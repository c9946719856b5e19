//! Telemetry: timing samples, performance summaries and metric names.
//!
//! Two complementary channels:
//!
//! - [`TelemetryCollector`] keeps bounded, in-process ring buffers of timing
//!   samples per operation name and turns them into a
//!   [`PerformanceSummary`] with threshold-based recommendations. This is
//!   what the operational surface reports on.
//!
//! - The `metrics` facade receives counters and histograms under the names
//!   below. Consumers install their own recorder (e.g. prometheus, statsd);
//!   without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `eir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "huggingface", "groq")
//! - `status`: outcome: "ok" or an error kind
//! - `backend`: cache backend: "redis" or "memory"
//! - `reason`: breaker trip reason

mod collector;
pub mod report;
mod system;

pub use collector::{
    MetricSample, OperationClass, OperationSummary, PerformanceSummary, QUERY_PREFIX,
    TEMPLATE_PREFIX, TelemetryCollector, TelemetryConfig, normalize_query,
};
pub use system::ResourceSnapshot;

/// Total provider calls dispatched by the orchestrator.
///
/// Labels: `provider`, `status` ("ok" | error kind).
pub const REQUESTS_TOTAL: &str = "eir_requests_total";

/// Provider call duration in seconds.
///
/// Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "eir_request_duration_seconds";

/// Providers skipped because their breaker was tripped.
///
/// Labels: `provider`.
pub const PROVIDER_SKIPS_TOTAL: &str = "eir_provider_skips_total";

/// Breaker transitions from available to tripped.
///
/// Labels: `provider`, `reason`.
pub const BREAKER_TRIPS_TOTAL: &str = "eir_breaker_trips_total";

/// Memoized completions served without calling a provider.
pub const COMPLETION_CACHE_HITS_TOTAL: &str = "eir_completion_cache_hits_total";

/// Total cache hits.
///
/// Labels: `backend`.
pub const CACHE_HITS_TOTAL: &str = "eir_cache_hits_total";

/// Total cache misses.
///
/// Labels: `backend`.
pub const CACHE_MISSES_TOTAL: &str = "eir_cache_misses_total";

/// Remote cache failures (each one degrades the store to memory).
///
/// Labels: `backend`.
pub const CACHE_ERRORS_TOTAL: &str = "eir_cache_errors_total";
