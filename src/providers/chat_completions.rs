//! Client for OpenAI-compatible chat-completions APIs (Groq, DeepSeek).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::envelope::extract_text;
use super::http::{build_client, check_status, json_body};
use super::traits::{GenerateRequest, Generation, TextProvider};
use crate::{EirError, Result};

pub const GROQ_NAME: &str = "groq";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const GROQ_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEEPSEEK_NAME: &str = "deepseek";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEEPSEEK_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for any service exposing `POST {base}/chat/completions`.
///
/// ```rust,no_run
/// # use eir::providers::ChatCompletionsClient;
/// # fn demo() -> eir::Result<()> {
/// let groq = ChatCompletionsClient::groq(Some("gsk-...".into()))?
///     .with_model("llama-3.3-70b-versatile");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatCompletionsClient {
    name: String,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    http: Client,
}

impl ChatCompletionsClient {
    pub fn new(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(60),
            http: build_client()?,
        })
    }

    pub fn groq(api_key: Option<String>) -> Result<Self> {
        Ok(Self::new(GROQ_NAME, api_key, GROQ_BASE_URL, GROQ_DEFAULT_MODEL)?
            .with_timeout(GROQ_TIMEOUT))
    }

    pub fn deepseek(api_key: Option<String>) -> Result<Self> {
        Ok(
            Self::new(DEEPSEEK_NAME, api_key, DEEPSEEK_BASE_URL, DEEPSEEK_DEFAULT_MODEL)?
                .with_timeout(DEEPSEEK_TIMEOUT),
        )
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (for testing with wiremock).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TextProvider for ChatCompletionsClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EirError::NotConfigured(format!("{} API key missing", self.name)))?;

        let mut messages = Vec::with_capacity(2);
        if !request.system.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&ChatRequest {
                model: &self.model,
                messages,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
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
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}
