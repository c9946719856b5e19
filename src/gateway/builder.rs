//! Builder for configuring gateway instances

use std::sync::Arc;
use std::time::Duration;

use super::breaker::{BreakerConfig, BreakerRegistry};
use super::orchestrator::{Orchestrator, OrchestratorConfig};
use super::Gateway;
use crate::cache::{CacheConfig, CacheStore};
use crate::config::{Config, ProviderSection, Secrets};
use crate::providers::{ChatCompletionsClient, TextProvider};
use crate::telemetry::{TelemetryCollector, TelemetryConfig};
use crate::{EirError, Result};

/// Provider slot, constructed at build time unless supplied ready-made.
enum PendingProvider {
    Ready(Arc<dyn TextProvider>),
    #[cfg(feature = "huggingface")]
    HuggingFace(Option<String>, ProviderSection),
    Groq(Option<String>, ProviderSection),
    DeepSeek(Option<String>, ProviderSection),
}

impl PendingProvider {
    fn build(self) -> Result<Arc<dyn TextProvider>> {
        Ok(match self {
            PendingProvider::Ready(provider) => provider,
            #[cfg(feature = "huggingface")]
            PendingProvider::HuggingFace(key, section) => {
                let timeout = section.timeout();
                let mut client = crate::providers::HuggingFaceClient::new(key)?;
                if let Some(model) = section.model {
                    client = client.with_model(model);
                }
                if let Some(url) = section.base_url {
                    client = client.with_base_url(url);
                }
                if let Some(url) = section.hub_url {
                    client = client.with_hub_url(url);
                }
                if let Some(timeout) = timeout {
                    client = client.with_timeout(timeout);
                }
                Arc::new(client)
            }
            PendingProvider::Groq(key, section) => {
                Arc::new(apply_overrides(ChatCompletionsClient::groq(key)?, section))
            }
            PendingProvider::DeepSeek(key, section) => {
                Arc::new(apply_overrides(ChatCompletionsClient::deepseek(key)?, section))
            }
        })
    }
}

fn apply_overrides(mut client: ChatCompletionsClient, section: ProviderSection) -> ChatCompletionsClient {
    let timeout = section.timeout();
    if let Some(model) = section.model {
        client = client.with_model(model);
    }
    if let Some(url) = section.base_url {
        client = client.with_base_url(url);
    }
    if let Some(timeout) = timeout {
        client = client.with_timeout(timeout);
    }
    client
}

/// Builder for [`Gateway`].
///
/// Providers are tried in the order they are added.
///
/// ```rust,no_run
/// # use eir::Gateway;
/// # async fn demo() -> eir::Result<()> {
/// let gateway = Gateway::builder()
///     .huggingface(std::env::var("HF_API_KEY").ok())
///     .groq(std::env::var("GROQ_API_KEY").ok())
///     .deepseek(std::env::var("DEEPSEEK_API_KEY").ok())
///     .redis_url("redis://localhost:6379/0")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct GatewayBuilder {
    providers: Vec<PendingProvider>,
    cache: Option<Arc<CacheStore>>,
    cache_config: CacheConfig,
    telemetry: Option<Arc<TelemetryCollector>>,
    telemetry_config: TelemetryConfig,
    breakers: Option<Arc<BreakerRegistry>>,
    breaker_config: BreakerConfig,
    orchestrator_config: OrchestratorConfig,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            cache: None,
            cache_config: CacheConfig::default(),
            telemetry: None,
            telemetry_config: TelemetryConfig::default(),
            breakers: None,
            breaker_config: BreakerConfig::default(),
            orchestrator_config: OrchestratorConfig::default(),
        }
    }

    /// Start from a loaded [`Config`], resolving API keys through `secrets`.
    ///
    /// Providers are added in `gateway.order`; unknown names are an error.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        let mut builder = Self::new()
            .cache_config(config.cache_config())
            .telemetry_config(config.telemetry_config())
            .breaker_config(config.breaker_config())
            .orchestrator_config(config.orchestrator_config());

        for name in &config.gateway.order {
            let key = secrets.api_key(name);
            let section = config.providers.get(name).cloned().unwrap_or_default();
            let pending = match name.as_str() {
                #[cfg(feature = "huggingface")]
                "huggingface" => PendingProvider::HuggingFace(key, section),
                #[cfg(not(feature = "huggingface"))]
                "huggingface" => {
                    tracing::warn!("huggingface listed in gateway.order but the feature is disabled");
                    continue;
                }
                "groq" => PendingProvider::Groq(key, section),
                "deepseek" => PendingProvider::DeepSeek(key, section),
                other => {
                    return Err(EirError::Configuration(format!(
                        "unknown provider in gateway.order: {other:?}"
                    )));
                }
            };
            builder.providers.push(pending);
        }
        Ok(builder)
    }

    /// Append an already-built provider.
    pub fn provider(mut self, provider: Arc<dyn TextProvider>) -> Self {
        self.providers.push(PendingProvider::Ready(provider));
        self
    }

    /// Append the HuggingFace Inference provider.
    #[cfg(feature = "huggingface")]
    pub fn huggingface(mut self, api_key: Option<String>) -> Self {
        self.providers
            .push(PendingProvider::HuggingFace(api_key, ProviderSection::default()));
        self
    }

    /// Append the Groq provider.
    pub fn groq(mut self, api_key: Option<String>) -> Self {
        self.providers
            .push(PendingProvider::Groq(api_key, ProviderSection::default()));
        self
    }

    /// Append the DeepSeek provider.
    pub fn deepseek(mut self, api_key: Option<String>) -> Self {
        self.providers
            .push(PendingProvider::DeepSeek(api_key, ProviderSection::default()));
        self
    }

    /// Use an existing cache store instead of building one.
    pub fn cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.cache_config.redis_url = Some(url.into());
        self
    }

    /// Use an existing collector instead of building one.
    pub fn telemetry(mut self, collector: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(collector);
        self
    }

    pub fn telemetry_config(mut self, config: TelemetryConfig) -> Self {
        self.telemetry_config = config;
        self
    }

    /// Share an existing breaker registry.
    pub fn breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn orchestrator_config(mut self, config: OrchestratorConfig) -> Self {
        self.orchestrator_config = config;
        self
    }

    /// Enable or disable completion memoization (default: enabled).
    pub fn memoize(mut self, enabled: bool) -> Self {
        self.orchestrator_config.memoize = enabled;
        self
    }

    pub fn memo_ttl(mut self, ttl: Duration) -> Self {
        self.orchestrator_config.memo_ttl = ttl;
        self
    }

    pub fn max_concurrent_per_provider(mut self, limit: usize) -> Self {
        self.orchestrator_config = self
            .orchestrator_config
            .max_concurrent_per_provider(Some(limit));
        self
    }

    /// Build the gateway, connecting to Redis when configured.
    pub async fn build(self) -> Result<Gateway> {
        if self.providers.is_empty() {
            return Err(EirError::Configuration("no providers configured".to_string()));
        }

        let providers = self
            .providers
            .into_iter()
            .map(PendingProvider::build)
            .collect::<Result<Vec<_>>>()?;

        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(TelemetryCollector::new(self.telemetry_config)));

        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(
                CacheStore::connect(&self.cache_config)
                    .await
                    .with_telemetry(Arc::clone(&telemetry)),
            ),
        };

        let breakers = self
            .breakers
            .unwrap_or_else(|| Arc::new(BreakerRegistry::new(self.breaker_config)));

        tracing::debug!(
            providers = providers.len(),
            cache_backend = %cache.backend_kind(),
            "gateway built"
        );

        Ok(Gateway::new(Orchestrator::new(
            providers,
            breakers,
            cache,
            telemetry,
            self.orchestrator_config,
        )))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_without_providers_fails() {
        let err = GatewayBuilder::new().build().await.err().unwrap();
        assert!(matches!(err, EirError::Configuration(_)));
    }

    #[test]
    fn unknown_provider_in_order_is_rejected() {
        let mut config = Config::default();
        config.gateway.order = vec!["groq".into(), "openai".into()];
        let err = GatewayBuilder::from_config(&config, &Secrets::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("openai"));
    }

    #[tokio::test]
    async fn provider_section_overrides_apply_together() {
        let mut config = Config::default();
        config.gateway.order = vec!["groq".into()];
        config.providers.groq = Some(ProviderSection {
            model: Some("llama-3.1-8b-instant".into()),
            base_url: Some("http://127.0.0.1:9".into()),
            hub_url: None,
            timeout_secs: Some(5),
        });
        let gateway = GatewayBuilder::from_config(&config, &Secrets::default())
            .unwrap()
            .build()
            .await
            .unwrap();
        assert_eq!(gateway.providers()[0].model, "llama-3.1-8b-instant");
    }

    #[tokio::test]
    async fn from_config_keeps_order() {
        let mut config = Config::default();
        config.gateway.order = vec!["deepseek".into(), "groq".into()];
        let gateway = GatewayBuilder::from_config(&config, &Secrets::default())
            .unwrap()
            .build()
            .await
            .unwrap();
        let names: Vec<_> = gateway.providers().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["deepseek", "groq"]);
    }
}
