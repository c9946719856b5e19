//! Text-generation provider adapters.
//!
//! Each adapter implements [`TextProvider`]: build the service's request,
//! map HTTP status onto the shared error taxonomy and normalize the response
//! body into one string.

mod chat_completions;
mod envelope;
mod http;
#[cfg(feature = "huggingface")]
pub mod huggingface;
pub mod traits;

pub use chat_completions::{
    ChatCompletionsClient, DEEPSEEK_BASE_URL, DEEPSEEK_DEFAULT_MODEL, DEEPSEEK_NAME,
    DEEPSEEK_TIMEOUT, GROQ_BASE_URL, GROQ_DEFAULT_MODEL, GROQ_NAME, GROQ_TIMEOUT,
};
#[cfg(feature = "huggingface")]
pub use huggingface::{HUGGINGFACE_NAME, HuggingFaceClient};
pub use traits::{
    AccessStatus, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GenerateRequest, Generation, TextProvider,
};
