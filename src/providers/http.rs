//! HTTP plumbing shared by the adapters.

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use crate::{EirError, Result};

/// Longest body excerpt carried in an error message.
const BODY_EXCERPT: usize = 200;

/// Build the shared HTTP client. Timeouts are applied per request.
pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("eir/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EirError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Pass successful responses through; map everything else onto the
/// provider error taxonomy.
pub(crate) async fn check_status(response: Response, model: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, model))
}

pub(crate) fn status_error(status: StatusCode, body: &str, model: &str) -> EirError {
    match status.as_u16() {
        401 => EirError::Unauthorized,
        402 => EirError::QuotaExhausted,
        403 => EirError::NotConfigured(format!("access to {model} denied")),
        404 => EirError::Unavailable(format!("model not found: {model}")),
        429 if reports_exhaustion(body) => EirError::QuotaExhausted,
        429 => EirError::Unavailable("rate limited".to_string()),
        503 => EirError::Unavailable(format!("model {model} is warming up")),
        code => EirError::Unavailable(format!("HTTP {code}: {}", excerpt(body))),
    }
}

/// Whether a 429 body describes exhausted quota or credit rather than a
/// short-term rate limit.
fn reports_exhaustion(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("quota") || body.contains("credit")
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Read a successful response body as JSON.
pub(crate) async fn json_body(response: Response) -> Result<Value> {
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| EirError::MalformedResponse(format!("invalid JSON body: {e}")))
}
