//! The inference gateway: breakers, fallback orchestration and the
//! consumer-facing [`Gateway`] handle.

mod breaker;
mod builder;
mod orchestrator;

use std::sync::Arc;

pub use breaker::{BreakerConfig, BreakerRegistry, BreakerState, ProviderDescriptor};
pub use builder::GatewayBuilder;
pub use orchestrator::{
    CompletionOptions, DEFAULT_MEMO_TTL, MEMO_PREFIX, Orchestrator, OrchestratorConfig,
};

use crate::cache::CacheStore;
use crate::config::{Config, Secrets};
use crate::providers::AccessStatus;
use crate::telemetry::{PerformanceSummary, TelemetryCollector};
use crate::Result;

/// Handle bundling the orchestrator with its cache, telemetry and breakers.
///
/// ```rust,no_run
/// # use eir::{CompletionOptions, Gateway};
/// # async fn demo() -> eir::Result<()> {
/// let gateway = Gateway::builder()
///     .groq(std::env::var("GROQ_API_KEY").ok())
///     .build()
///     .await?;
///
/// let answer = gateway
///     .generate_completion(
///         "You are a careful medical assistant.",
///         "Summarize the risks of combining ibuprofen and warfarin.",
///         &CompletionOptions::default(),
///     )
///     .await?;
/// println!("{answer}");
/// # Ok(())
/// # }
/// ```
pub struct Gateway {
    orchestrator: Orchestrator,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Build a gateway from configuration files and environment.
    pub async fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        GatewayBuilder::from_config(config, secrets)?.build().await
    }

    /// See [`Orchestrator::generate_completion`].
    pub async fn generate_completion(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        self.orchestrator
            .generate_completion(system, prompt, options)
            .await
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.orchestrator.cache()
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCollector> {
        self.orchestrator.telemetry()
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        self.orchestrator.breakers()
    }

    /// Performance summary over the gateway's telemetry and cache counters.
    pub fn summarize(&self) -> PerformanceSummary {
        self.telemetry().summarize(&self.cache().stats())
    }

    /// Clear every breaker trip.
    pub fn reset_breakers(&self) {
        self.breakers().reset_all();
    }

    /// Registered providers with their breaker state, in fallback order.
    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        self.breakers().descriptors()
    }

    /// Run each provider's access check. Does not touch breaker state.
    pub async fn check_access(&self) -> Vec<(String, Result<AccessStatus>)> {
        let mut results = Vec::new();
        for provider in self.orchestrator.providers() {
            results.push((provider.name().to_string(), provider.check_access().await));
        }
        results
    }
}
