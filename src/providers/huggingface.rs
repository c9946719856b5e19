//! HuggingFace Inference API client for text generation.
//!
//! Gated models need an accepted license on the account behind the token.
//! The client asks the Hub once, before its first generation, whether the
//! token can see the model; a denial becomes `NotConfigured` so the breaker
//! takes the provider out of rotation.
//!
//! See: <https://huggingface.co/docs/api-inference/index>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::envelope::extract_text;
use super::http::{build_client, check_status, json_body};
use super::traits::{AccessStatus, GenerateRequest, Generation, TextProvider};
use crate::{EirError, Result};

pub const HUGGINGFACE_NAME: &str = "huggingface";

/// Default base URL for the HuggingFace Inference API
pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Default base URL for the HuggingFace Hub API
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.1-8B-Instruct";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the HuggingFace serverless text-generation endpoint.
pub struct HuggingFaceClient {
    api_key: Option<String>,
    model: String,
    base_url: String,
    hub_url: String,
    timeout: Duration,
    http: Client,
    /// First successful access check; failures are not memoized.
    access: OnceCell<AccessStatus>,
}

impl HuggingFaceClient {
    /// Create a client for [`DEFAULT_MODEL`]. Without a key every call
    /// fails with `NotConfigured` and no request is sent.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            http: build_client()?,
            access: OnceCell::new(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.access = OnceCell::new();
        self
    }

    /// Override the inference base URL (for testing with wiremock).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the Hub base URL used for access checks.
    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into();
        self.access = OnceCell::new();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| EirError::NotConfigured("HuggingFace API key missing".into()))
    }

    async fn fetch_access(&self) -> Result<AccessStatus> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/api/models/{}",
            self.hub_url.trim_end_matches('/'),
            self.model
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = match response.status().as_u16() {
            200..=299 => AccessStatus::granted(),
            401 => AccessStatus::denied("token rejected by the HuggingFace Hub"),
            403 => AccessStatus::denied(format!("access to gated model {} not granted", self.model)),
            404 => AccessStatus::denied(format!("model {} not found on the Hub", self.model)),
            code => {
                return Err(EirError::Unavailable(format!(
                    "HuggingFace Hub access check failed with HTTP {code}"
                )));
            }
        };
        tracing::debug!(model = %self.model, granted = status.granted, "huggingface access checked");
        Ok(status)
    }

    async fn ensure_access(&self) -> Result<()> {
        let status = self
            .access
            .get_or_try_init(|| self.fetch_access())
            .await?;
        if status.granted {
            Ok(())
        } else {
            Err(EirError::NotConfigured(
                status
                    .reason
                    .clone()
                    .unwrap_or_else(|| "access denied".to_string()),
            ))
        }
    }
}

#[async_trait]
impl TextProvider for HuggingFaceClient {
    fn name(&self) -> &str {
        HUGGINGFACE_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn check_access(&self) -> Result<AccessStatus> {
        if self.api_key.is_none() {
            return Ok(AccessStatus::denied("HuggingFace API key missing"));
        }
        self.access
            .get_or_try_init(|| self.fetch_access())
            .await
            .cloned()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation> {
        let api_key = self.api_key()?;
        self.ensure_access().await?;

        let url = format!("{}/models/{}", self.base_url.trim_end_matches('/'), self.model);
        let inputs = request.combined_prompt();
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&TextGenerationRequest {
                inputs: &inputs,
                parameters: TextGenerationParameters {
                    temperature: request.temperature,
                    max_new_tokens: request.max_tokens,
                    do_sample: request.temperature > 0.0,
                    return_full_text: false,
                },
            })
            .send()
            .await?;

        let response = check_status(response, &self.model).await?;
        let raw = json_body(response).await?;
        let text = extract_text(&raw)?;
        Ok(Generation { text, raw })
    }
}

#[derive(Serialize)]
struct TextGenerationRequest<'a> {
    inputs: &'a str,
    parameters: TextGenerationParameters,
}

#[derive(Serialize)]
struct TextGenerationParameters {
    temperature: f32,
    max_new_tokens: u32,
    do_sample: bool,
    return_full_text: bool,
}
