//! In-process timing collector with threshold-based recommendations.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;

use super::system::{ProcessProbe, ResourceSnapshot};
use crate::cache::CacheStats;

/// Name prefix marking database-query operations.
pub const QUERY_PREFIX: &str = "query:";

/// Name prefix marking template-render operations.
pub const TEMPLATE_PREFIX: &str = "template:";

/// Configuration for the [`TelemetryCollector`].
///
/// ```rust
/// # use eir::TelemetryConfig;
/// # use std::time::Duration;
/// let config = TelemetryConfig::new()
///     .max_samples(1_000)
///     .slow_query_threshold(Duration::from_millis(50));
/// ```
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Samples retained per operation name. Default: 500.
    pub max_samples: usize,
    /// Mean duration above which a query is reported as slow. Default: 100ms.
    pub slow_query_threshold: Duration,
    /// Mean duration above which a template is reported as slow. Default: 500ms.
    pub slow_template_threshold: Duration,
    /// Cache hit ratio below which a cache review is recommended. Default: 0.7.
    pub min_hit_ratio: f64,
    /// Whether summaries include a process CPU/memory snapshot. Default: true.
    pub capture_resources: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_samples: 500,
            slow_query_threshold: Duration::from_millis(100),
            slow_template_threshold: Duration::from_millis(500),
            min_hit_ratio: 0.7,
            capture_resources: true,
        }
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_samples(mut self, n: usize) -> Self {
        self.max_samples = n.max(1);
        self
    }

    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn slow_template_threshold(mut self, threshold: Duration) -> Self {
        self.slow_template_threshold = threshold;
        self
    }

    pub fn min_hit_ratio(mut self, ratio: f64) -> Self {
        self.min_hit_ratio = ratio;
        self
    }

    pub fn capture_resources(mut self, enabled: bool) -> Self {
        self.capture_resources = enabled;
        self
    }
}

/// A single timing observation.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub operation: String,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

/// Threshold class of an operation, derived from its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Query,
    Template,
    Other,
}

impl OperationClass {
    pub fn of(operation: &str) -> Self {
        if operation.starts_with(QUERY_PREFIX) {
            OperationClass::Query
        } else if operation.starts_with(TEMPLATE_PREFIX) {
            OperationClass::Template
        } else {
            OperationClass::Other
        }
    }
}

/// Aggregates over the retained samples of one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub name: String,
    pub class: OperationClass,
    pub count: usize,
    pub mean_secs: f64,
    pub max_secs: f64,
    pub p95_secs: f64,
}

impl OperationSummary {
    fn from_samples(name: &str, samples: &VecDeque<MetricSample>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut durations: Vec<f64> = samples.iter().map(|s| s.duration_secs).collect();
        durations.sort_by(f64::total_cmp);

        let count = durations.len();
        let mean_secs = durations.iter().sum::<f64>() / count as f64;
        let p95_index = ((count as f64 * 0.95).ceil() as usize).clamp(1, count) - 1;

        Some(Self {
            name: name.to_string(),
            class: OperationClass::of(name),
            count,
            mean_secs,
            max_secs: durations[count - 1],
            p95_secs: durations[p95_index],
        })
    }
}

/// Point-in-time performance report.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub generated_at: DateTime<Utc>,
    pub cache: CacheStats,
    pub operations: Vec<OperationSummary>,
    /// Query operations whose mean exceeds the query threshold, slowest first.
    pub slow_queries: Vec<String>,
    /// Template operations whose mean exceeds the template threshold, slowest first.
    pub slow_templates: Vec<String>,
    pub resources: Option<ResourceSnapshot>,
    pub recommendations: Vec<String>,
}

/// Recommendation emitted when no rule fires.
pub(crate) const NO_ISSUES: &str = "No performance issues detected";

/// Thread-safe collector of timing samples.
///
/// Each operation name owns a ring buffer capped at
/// [`TelemetryConfig::max_samples`]; the oldest sample is dropped once the
/// cap is exceeded. A single mutex guards all buffers and is held only for
/// the in-memory update.
pub struct TelemetryCollector {
    config: TelemetryConfig,
    series: Mutex<HashMap<String, VecDeque<MetricSample>>>,
    probe: Mutex<ProcessProbe>,
}

impl TelemetryCollector {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            series: Mutex::new(HashMap::new()),
            probe: Mutex::new(ProcessProbe::new()),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Record a timing sample for `operation`.
    ///
    /// Non-finite durations are ignored; negative durations are clamped to zero.
    pub fn record(
        &self,
        operation: impl Into<String>,
        duration_secs: f64,
        metadata: BTreeMap<String, String>,
    ) {
        if !duration_secs.is_finite() {
            return;
        }
        let sample = MetricSample {
            operation: operation.into(),
            duration_secs: duration_secs.max(0.0),
            timestamp: Utc::now(),
            metadata,
        };

        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let samples = series.entry(sample.operation.clone()).or_default();
        samples.push_back(sample);
        while samples.len() > self.config.max_samples {
            samples.pop_front();
        }
    }

    /// Record a duration without metadata.
    pub fn record_duration(&self, operation: impl Into<String>, duration: Duration) {
        self.record(operation, duration.as_secs_f64(), BTreeMap::new());
    }

    /// Record a database query, keyed by its normalized text.
    pub fn record_query(&self, sql: &str, duration: Duration) {
        let normalized = normalize_query(sql);
        let metadata = BTreeMap::from([("query".to_string(), normalized.clone())]);
        self.record(
            format!("{QUERY_PREFIX}{normalized}"),
            duration.as_secs_f64(),
            metadata,
        );
    }

    /// Record a template render.
    pub fn record_template(&self, template: &str, duration: Duration) {
        let metadata = BTreeMap::from([("template".to_string(), template.to_string())]);
        self.record(
            format!("{TEMPLATE_PREFIX}{template}"),
            duration.as_secs_f64(),
            metadata,
        );
    }

    /// Await `fut` and record how long it took under `operation`.
    pub async fn time<F, T>(&self, operation: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let output = fut.await;
        self.record_duration(operation, start.elapsed());
        output
    }

    /// Names with at least one retained sample, sorted.
    pub fn operation_names(&self) -> Vec<String> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = series.keys().cloned().collect();
        names.sort();
        names
    }

    /// Retained samples for `operation`, oldest first.
    pub fn samples(&self, operation: &str) -> Vec<MetricSample> {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series
            .get(operation)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn sample_count(&self, operation: &str) -> usize {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        series.get(operation).map_or(0, VecDeque::len)
    }

    /// Drop all retained samples.
    pub fn clear(&self) {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Build a [`PerformanceSummary`] from the retained samples and the
    /// supplied cache counters.
    pub fn summarize(&self, cache: &CacheStats) -> PerformanceSummary {
        let mut operations: Vec<OperationSummary> = {
            let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
            series
                .iter()
                .filter_map(|(name, samples)| OperationSummary::from_samples(name, samples))
                .collect()
        };
        operations.sort_by(|a, b| a.name.cmp(&b.name));

        let slow_queries = slow_names(
            &operations,
            OperationClass::Query,
            self.config.slow_query_threshold,
        );
        let slow_templates = slow_names(
            &operations,
            OperationClass::Template,
            self.config.slow_template_threshold,
        );

        let resources = if self.config.capture_resources {
            self.probe
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot()
        } else {
            None
        };

        let recommendations = recommendations(
            cache,
            &slow_queries,
            &slow_templates,
            self.config.min_hit_ratio,
        );

        PerformanceSummary {
            generated_at: Utc::now(),
            cache: cache.clone(),
            operations,
            slow_queries,
            slow_templates,
            resources,
            recommendations,
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

fn slow_names(
    operations: &[OperationSummary],
    class: OperationClass,
    threshold: Duration,
) -> Vec<String> {
    let threshold = threshold.as_secs_f64();
    let mut slow: Vec<&OperationSummary> = operations
        .iter()
        .filter(|op| op.class == class && op.mean_secs > threshold)
        .collect();
    slow.sort_by(|a, b| b.mean_secs.total_cmp(&a.mean_secs));
    slow.into_iter().map(|op| op.name.clone()).collect()
}

fn recommendations(
    cache: &CacheStats,
    slow_queries: &[String],
    slow_templates: &[String],
    min_hit_ratio: f64,
) -> Vec<String> {
    let mut out = Vec::new();

    let lookups = cache.hits + cache.misses;
    if lookups > 0 && cache.hit_ratio < min_hit_ratio {
        out.push(format!(
            "Cache hit ratio is {:.1}% (target {:.0}%): review cache strategy, key design and TTLs",
            cache.hit_ratio * 100.0,
            min_hit_ratio * 100.0
        ));
    }
    if !slow_queries.is_empty() {
        out.push(format!(
            "{} slow quer{} detected: consider adding database indexes or optimizing them",
            slow_queries.len(),
            if slow_queries.len() == 1 { "y" } else { "ies" }
        ));
    }
    if !slow_templates.is_empty() {
        out.push(format!(
            "{} slow template{} detected: consider fragment caching",
            slow_templates.len(),
            if slow_templates.len() == 1 { "" } else { "s" }
        ));
    }
    if out.is_empty() {
        out.push(NO_ISSUES.to_string());
    }
    out
}

static QUOTED_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid regex"));
static NUMERIC_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("valid regex"));
static IN_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bIN\s*\(\s*\?(?:\s*,\s*\?)*\s*\)").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Collapse literals in a SQL statement so equivalent queries share a name.
///
/// ```rust
/// # use eir::telemetry::normalize_query;
/// assert_eq!(
///     normalize_query("SELECT * FROM records WHERE id = 42 AND name = 'Ann'"),
///     "SELECT * FROM records WHERE id = ? AND name = ?"
/// );
/// ```
pub fn normalize_query(sql: &str) -> String {
    let sql = QUOTED_LITERAL.replace_all(sql, "?");
    let sql = NUMERIC_LITERAL.replace_all(&sql, "?");
    let sql = IN_LIST.replace_all(&sql, "IN (?)");
    WHITESPACE.replace_all(sql.trim(), " ").into_owned()
}
