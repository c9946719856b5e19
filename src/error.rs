//! Eir error types

use std::fmt;

use serde::Serialize;

/// Why a provider's availability breaker was tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripReason {
    QuotaExhausted,
    Unauthorized,
    NotConfigured,
}

impl TripReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripReason::QuotaExhausted => "quota exhausted",
            TripReason::Unauthorized => "unauthorized",
            TripReason::NotConfigured => "not configured",
        }
    }
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider's outcome within an exhausted fallback pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    /// Provider name (e.g. `"groq"`).
    pub provider: String,
    /// Human-readable failure reason.
    pub reason: String,
    /// True when the provider was skipped because its breaker was tripped.
    pub skipped: bool,
}

impl ProviderFailure {
    pub(crate) fn skipped(provider: &str, reason: Option<TripReason>) -> Self {
        let reason = match reason {
            Some(r) => format!("skipped: breaker tripped ({r})"),
            None => "skipped: breaker tripped".to_string(),
        };
        Self {
            provider: provider.to_string(),
            reason,
            skipped: true,
        }
    }

    pub(crate) fn failed(provider: &str, err: &EirError) -> Self {
        Self {
            provider: provider.to_string(),
            reason: err.to_string(),
            skipped: false,
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Eir error types
#[derive(Debug, thiserror::Error)]
pub enum EirError {
    // Provider errors that trip the availability breaker
    #[error("authentication failed")]
    Unauthorized,

    #[error("quota exhausted")]
    QuotaExhausted,

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    // Transient provider errors, scoped to a single call
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Every provider in the fallback chain was skipped or failed.
    #[error("all providers exhausted ({})", join_failures(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },

    /// Remote cache unreachable (connection lost, refused or timed out).
    /// The cache store never returns this to callers; it degrades to the
    /// in-process backend instead.
    #[error("cache backend error: {0}")]
    CacheBackend(String),

    /// The remote cache answered but rejected the command or returned a
    /// value that could not be read. Scoped to the one call; the store
    /// keeps using the remote backend.
    #[error("cache command failed: {0}")]
    CacheCommand(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EirError {
    /// The breaker trip this error implies, if any.
    pub fn trip_reason(&self) -> Option<TripReason> {
        match self {
            EirError::Unauthorized => Some(TripReason::Unauthorized),
            EirError::QuotaExhausted => Some(TripReason::QuotaExhausted),
            EirError::NotConfigured(_) => Some(TripReason::NotConfigured),
            _ => None,
        }
    }

    /// Whether the error only affects the current call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EirError::Unavailable(_) | EirError::Timeout | EirError::MalformedResponse(_)
        )
    }

    /// Short label used for metrics and telemetry metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            EirError::Unauthorized => "unauthorized",
            EirError::QuotaExhausted => "quota_exhausted",
            EirError::NotConfigured(_) => "not_configured",
            EirError::Unavailable(_) => "unavailable",
            EirError::Timeout => "timeout",
            EirError::MalformedResponse(_) => "malformed_response",
            EirError::AllProvidersExhausted { .. } => "all_providers_exhausted",
            EirError::CacheBackend(_) => "cache_backend",
            EirError::CacheCommand(_) => "cache_command",
            EirError::Configuration(_) => "configuration",
            EirError::Io(_) => "io",
            EirError::Json(_) => "json",
        }
    }
}

impl From<reqwest::Error> for EirError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EirError::Timeout
        } else if err.is_decode() {
            EirError::MalformedResponse(err.to_string())
        } else {
            EirError::Unavailable(err.to_string())
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for EirError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            EirError::CacheBackend(err.to_string())
        } else {
            EirError::CacheCommand(err.to_string())
        }
    }
}

/// Result type alias for Eir operations
pub type Result<T> = std::result::Result<T, EirError>;

#[cfg(all(test, feature = "redis"))]
mod tests {
    use super::*;
    use redis::{ErrorKind, RedisError};

    #[test]
    fn lost_connection_is_a_backend_failure() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        assert!(matches!(EirError::from(err), EirError::CacheBackend(_)));
    }

    #[test]
    fn rejected_command_stays_scoped_to_the_call() {
        let err = RedisError::from((
            ErrorKind::UnexpectedReturnType,
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        ));
        assert!(matches!(EirError::from(err), EirError::CacheCommand(_)));

        let err = RedisError::from((ErrorKind::Parse, "invalid utf-8"));
        assert_eq!(EirError::from(err).kind(), "cache_command");
    }
}
