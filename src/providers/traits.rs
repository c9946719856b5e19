//! The text-generation provider contract.
//!
//! Every adapter maps its service's failures onto the shared taxonomy in
//! [`EirError`](crate::EirError):
//! - `Unauthorized`, `QuotaExhausted`, `NotConfigured` mean the provider is
//!   unusable until an operator intervenes; the orchestrator trips its breaker
//! - `Unavailable`, `Timeout`, `MalformedResponse` only affect the current call
//!
//! Adapters never retry. Ordering and fallback belong to the
//! [`Orchestrator`](crate::gateway::Orchestrator).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default completion length limit.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Input to a single generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    /// System instruction; may be empty.
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// System instruction and prompt as one text, for completion-only models.
    pub fn combined_prompt(&self) -> String {
        if self.system.trim().is_empty() {
            self.prompt.clone()
        } else {
            format!("{}\n\n{}", self.system.trim_end(), self.prompt)
        }
    }
}

/// A successful generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Normalized output text.
    pub text: String,
    /// The decoded response body, as returned by the service.
    pub raw: Value,
}

/// Result of a provider access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessStatus {
    pub granted: bool,
    /// Why access was denied.
    pub reason: Option<String>,
}

impl AccessStatus {
    pub fn granted() -> Self {
        Self {
            granted: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            granted: false,
            reason: Some(reason.into()),
        }
    }
}

/// A text-generation service.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Provider name used for breakers, telemetry and logs.
    fn name(&self) -> &str;

    /// Model this provider is configured to call.
    fn model(&self) -> &str;

    /// Whether the configured credentials may use the model.
    ///
    /// Providers without a separate access check report granted.
    async fn check_access(&self) -> Result<AccessStatus> {
        Ok(AccessStatus::granted())
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation>;
}
