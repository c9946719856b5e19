//! Response envelope normalization.
//!
//! Services answer in one of a few shapes:
//! - OpenAI-style chat completions: `{"choices": [{"message": {"content": ..}}]}`
//! - HuggingFace text generation: `[{"generated_text": ..}]`
//! - A single generation object: `{"generated_text": ..}`
//! - An error object in a 200 body: `{"error": ..}`
//!
//! [`extract_text`] decodes whichever shape arrives into one string.

use serde::Deserialize;
use serde_json::Value;

use crate::{EirError, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Chat { choices: Vec<Choice> },
    Failure { error: ErrorBody },
    Generations(Vec<GeneratedText>),
    Single(GeneratedText),
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
    /// Legacy completions endpoints put the text here.
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Message(String),
    Object { message: String },
}

impl ErrorBody {
    fn message(&self) -> &str {
        match self {
            ErrorBody::Message(m) | ErrorBody::Object { message: m } => m,
        }
    }
}

/// Decode a response body into its generated text.
///
/// An unrecognized shape or an empty generation is `MalformedResponse`; an
/// error object is `Unavailable` since services use it for transient states
/// such as a model still loading.
pub(crate) fn extract_text(body: &Value) -> Result<String> {
    let envelope = Envelope::deserialize(body)
        .map_err(|_| EirError::MalformedResponse(format!("unrecognized response shape: {}", shape(body))))?;

    let text = match envelope {
        Envelope::Chat { choices } => choices
            .into_iter()
            .next()
            .and_then(|c| c.message.and_then(|m| m.content).or(c.text))
            .ok_or_else(|| EirError::MalformedResponse("no choices in response".into()))?,
        Envelope::Generations(items) => items
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| EirError::MalformedResponse("empty generation list".into()))?,
        Envelope::Single(g) => g.generated_text,
        Envelope::Failure { error } => {
            return Err(EirError::Unavailable(error.message().to_string()));
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(EirError::MalformedResponse("empty generation".into()));
    }
    Ok(text.to_string())
}

fn shape(body: &Value) -> &'static str {
    match body {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
