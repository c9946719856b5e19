//! Ordered single-pass fallback across text providers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::instrument;

use super::breaker::BreakerRegistry;
use crate::cache::CacheStore;
use crate::error::ProviderFailure;
use crate::providers::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GenerateRequest, Generation, TextProvider};
use crate::telemetry::{self, TelemetryCollector};
use crate::{EirError, Result};

/// Key namespace for memoized completions.
pub const MEMO_PREFIX: &str = "ai_response";

/// Default lifetime of a memoized completion.
pub const DEFAULT_MEMO_TTL: Duration = Duration::from_secs(30 * 60);

/// Orchestrator-wide settings.
///
/// ```rust
/// # use eir::OrchestratorConfig;
/// # use std::time::Duration;
/// let config = OrchestratorConfig::new()
///     .memo_ttl(Duration::from_secs(600))
///     .max_concurrent_per_provider(Some(4));
/// ```
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Whether successful completions are memoized in the cache. Default: true.
    pub memoize: bool,
    /// Lifetime of memoized completions. Default: 30 minutes.
    pub memo_ttl: Duration,
    /// In-flight call limit per provider. Default: unbounded.
    pub max_concurrent_per_provider: Option<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            memoize: true,
            memo_ttl: DEFAULT_MEMO_TTL,
            max_concurrent_per_provider: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memoize(mut self, enabled: bool) -> Self {
        self.memoize = enabled;
        self
    }

    pub fn memo_ttl(mut self, ttl: Duration) -> Self {
        self.memo_ttl = ttl;
        self
    }

    pub fn max_concurrent_per_provider(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_per_provider = limit.map(|n| n.max(1));
        self
    }
}

/// Per-request generation options.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// Default: 0.7.
    pub temperature: f32,
    /// Default: 512.
    pub max_tokens: u32,
    /// Consult and populate the memo cache. Default: true.
    pub use_cache: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            use_cache: true,
        }
    }
}

impl CompletionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }
}

struct Slot {
    provider: Arc<dyn TextProvider>,
    permits: Option<Semaphore>,
}

/// Walks a fixed provider list and returns the first success.
///
/// Tripped providers are skipped without a network call. A failing
/// provider trips its breaker when the error says it is unusable
/// (`Unauthorized`, `QuotaExhausted`, `NotConfigured`); transient errors do
/// not. There are no retries: one pass, then `AllProvidersExhausted`.
pub struct Orchestrator {
    slots: Vec<Slot>,
    breakers: Arc<BreakerRegistry>,
    cache: Arc<CacheStore>,
    telemetry: Arc<TelemetryCollector>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator over `providers`, in priority order. Every
    /// provider is registered with `breakers`.
    pub fn new(
        providers: Vec<Arc<dyn TextProvider>>,
        breakers: Arc<BreakerRegistry>,
        cache: Arc<CacheStore>,
        telemetry: Arc<TelemetryCollector>,
        config: OrchestratorConfig,
    ) -> Self {
        let slots = providers
            .into_iter()
            .map(|provider| {
                breakers.register(provider.name(), provider.model());
                Slot {
                    provider,
                    permits: config.max_concurrent_per_provider.map(Semaphore::new),
                }
            })
            .collect();
        Self {
            slots,
            breakers,
            cache,
            telemetry,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn TextProvider>> {
        self.slots.iter().map(|s| &s.provider)
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCollector> {
        &self.telemetry
    }

    /// Cache key for a completion: `ai_response:<sha256 hex>` over the
    /// system instruction, the prompt and the provider/model chain.
    pub fn memo_key(&self, system: &str, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        let mut feed = |part: &str| {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        };
        feed(system);
        feed(prompt);
        for slot in &self.slots {
            feed(slot.provider.name());
            feed(slot.provider.model());
        }
        format!("{MEMO_PREFIX}:{}", hex::encode(hasher.finalize()))
    }

    /// Produce a completion from the first provider that succeeds.
    ///
    /// The caller never learns which provider answered.
    #[instrument(skip_all, fields(providers = self.slots.len(), use_cache = options.use_cache))]
    pub async fn generate_completion(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let memo_key = (self.config.memoize && options.use_cache).then(|| self.memo_key(system, prompt));

        if let Some(ref key) = memo_key
            && let Some(text) = self.cache.get::<String>(key).await
        {
            tracing::debug!(key = %key, "serving memoized completion");
            metrics::counter!(telemetry::COMPLETION_CACHE_HITS_TOTAL).increment(1);
            return Ok(text);
        }

        let request = GenerateRequest::new(system, prompt)
            .temperature(options.temperature)
            .max_tokens(options.max_tokens);

        let mut failures = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let name = slot.provider.name();

            if !self.breakers.is_available(name) {
                tracing::debug!(provider = name, "skipping tripped provider");
                metrics::counter!(telemetry::PROVIDER_SKIPS_TOTAL, "provider" => name.to_owned())
                    .increment(1);
                failures.push(ProviderFailure::skipped(name, self.breakers.trip_reason(name)));
                continue;
            }

            match self.call(slot, &request).await {
                Ok(generation) => {
                    self.breakers.record_success(name);
                    if let Some(ref key) = memo_key {
                        self.cache
                            .set(key, &generation.text, self.config.memo_ttl)
                            .await;
                    }
                    return Ok(generation.text);
                }
                Err(e) => {
                    match e.trip_reason() {
                        Some(reason) => {
                            self.breakers.trip(name, reason);
                        }
                        None => {
                            tracing::warn!(provider = name, error = %e, "provider call failed, trying next");
                        }
                    }
                    failures.push(ProviderFailure::failed(name, &e));
                }
            }
        }

        tracing::error!(attempted = failures.len(), "all providers exhausted");
        Err(EirError::AllProvidersExhausted { failures })
    }

    /// One provider call, bounded by the provider's permit pool when set.
    async fn call(&self, slot: &Slot, request: &GenerateRequest) -> Result<Generation> {
        let _permit = match slot.permits {
            Some(ref permits) => Some(
                permits
                    .acquire()
                    .await
                    .map_err(|_| EirError::Unavailable("provider permit pool closed".into()))?,
            ),
            None => None,
        };

        let start = Instant::now();
        let result = slot.provider.generate(request).await;
        self.record_call(slot.provider.as_ref(), &result, start.elapsed());
        result
    }

    fn record_call(&self, provider: &dyn TextProvider, result: &Result<Generation>, elapsed: Duration) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        let metadata = BTreeMap::from([
            ("model".to_string(), provider.model().to_string()),
            ("outcome".to_string(), outcome.to_string()),
        ]);
        self.telemetry.record(
            format!("provider:{}", provider.name()),
            elapsed.as_secs_f64(),
            metadata,
        );

        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.name().to_owned(),
            "status" => outcome,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider.name().to_owned(),
        )
        .record(elapsed.as_secs_f64());
    }
}
