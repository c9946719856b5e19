//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.eir/config.toml` (user)
//! 3. `/etc/eir/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.eir/secrets.toml` (user, must be 0600)
//! 2. `/etc/eir/secrets.toml` (system, must be 0600)
//!
//! API keys missing from the secrets file fall back to `HF_API_KEY`,
//! `GROQ_API_KEY` and `DEEPSEEK_API_KEY`. `REDIS_URL` overrides the
//! configured cache URL.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheConfig, DEFAULT_MAX_ENTRIES};
use crate::gateway::{BreakerConfig, DEFAULT_MEMO_TTL, OrchestratorConfig};
use crate::telemetry::TelemetryConfig;
use crate::{EirError, Result};

/// Environment variable overriding `cache.redis_url`.
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Fallback order and orchestration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Provider names in fallback order (default: huggingface, groq, deepseek).
    #[serde(default = "default_order")]
    pub order: Vec<String>,
    /// Memoize successful completions (default: true).
    #[serde(default = "default_true")]
    pub memoize: bool,
    /// Lifetime of memoized completions in seconds (default: 1800).
    #[serde(default = "default_memo_ttl")]
    pub memo_ttl_secs: u64,
    /// In-flight call limit per provider (default: unbounded).
    #[serde(default)]
    pub max_concurrent_per_provider: Option<usize>,
    /// Admit a probe call to a tripped provider after this many seconds
    /// (default: never; breakers stay tripped until reset).
    #[serde(default)]
    pub recovery_after_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            memoize: true,
            memo_ttl_secs: default_memo_ttl(),
            max_concurrent_per_provider: None,
            recovery_after_secs: None,
        }
    }
}

fn default_order() -> Vec<String> {
    vec![
        "huggingface".to_string(),
        "groq".to_string(),
        "deepseek".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_memo_ttl() -> u64 {
    DEFAULT_MEMO_TTL.as_secs()
}

/// Cache store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// In-process capacity (default: 1000).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Redis URL; absent means in-process only.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Per-command Redis timeout in milliseconds (default: 2000).
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            redis_url: None,
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_op_timeout_ms() -> u64 {
    2_000
}

/// Telemetry thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,
    #[serde(default = "default_slow_template_ms")]
    pub slow_template_ms: u64,
    #[serde(default = "default_min_hit_ratio")]
    pub min_hit_ratio: f64,
    #[serde(default = "default_true")]
    pub capture_resources: bool,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            slow_query_ms: default_slow_query_ms(),
            slow_template_ms: default_slow_template_ms(),
            min_hit_ratio: default_min_hit_ratio(),
            capture_resources: true,
        }
    }
}

fn default_max_samples() -> usize {
    500
}

fn default_slow_query_ms() -> u64 {
    100
}

fn default_slow_template_ms() -> u64 {
    500
}

fn default_min_hit_ratio() -> f64 {
    0.7
}

/// Per-provider overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub huggingface: Option<ProviderSection>,
    #[serde(default)]
    pub groq: Option<ProviderSection>,
    #[serde(default)]
    pub deepseek: Option<ProviderSection>,
}

impl ProvidersConfig {
    pub fn get(&self, provider: &str) -> Option<&ProviderSection> {
        match provider {
            "huggingface" => self.huggingface.as_ref(),
            "groq" => self.groq.as_ref(),
            "deepseek" => self.deepseek.as_ref(),
            _ => None,
        }
    }
}

/// Overrides for one provider; unset fields keep the adapter defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// HuggingFace only: Hub URL for access checks.
    #[serde(default)]
    pub hub_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.eir/config.toml`
    /// 3. `/etc/eir/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_file(&path)
    }

    /// Like [`load`](Self::load), but falls back to defaults when no
    /// config file exists. An explicit path must still exist.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        if explicit_path.is_some() {
            return Self::load(explicit_path);
        }
        match Self::find_config_path() {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            EirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(EirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Self::find_config_path().ok_or_else(|| {
            EirError::Configuration(
                "No config file found. Create ~/.eir/config.toml or /etc/eir/config.toml"
                    .to_string(),
            )
        })
    }

    fn find_config_path() -> Option<PathBuf> {
        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".eir").join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/eir/config.toml");
        system_config.exists().then_some(system_config)
    }

    /// Redis URL after applying the `REDIS_URL` override.
    pub fn redis_url(&self) -> Option<String> {
        resolve_redis_url(
            self.cache.redis_url.as_deref(),
            std::env::var(REDIS_URL_ENV).ok(),
        )
    }

    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::new()
            .max_entries(self.cache.max_entries)
            .op_timeout(Duration::from_millis(self.cache.op_timeout_ms));
        config.redis_url = self.redis_url();
        config
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig::new()
            .max_samples(self.telemetry.max_samples)
            .slow_query_threshold(Duration::from_millis(self.telemetry.slow_query_ms))
            .slow_template_threshold(Duration::from_millis(self.telemetry.slow_template_ms))
            .min_hit_ratio(self.telemetry.min_hit_ratio)
            .capture_resources(self.telemetry.capture_resources)
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::new().recovery_after(self.gateway.recovery_after_secs.map(Duration::from_secs))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::new()
            .memoize(self.gateway.memoize)
            .memo_ttl(Duration::from_secs(self.gateway.memo_ttl_secs))
            .max_concurrent_per_provider(self.gateway.max_concurrent_per_provider)
    }
}

fn resolve_redis_url(from_file: Option<&str>, from_env: Option<String>) -> Option<String> {
    from_env
        .filter(|url| !url.trim().is_empty())
        .or_else(|| from_file.map(str::to_string))
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub huggingface: Option<ApiKeySecret>,
    #[serde(default)]
    pub groq: Option<ApiKeySecret>,
    #[serde(default)]
    pub deepseek: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("huggingface", "HF_API_KEY"),
    ("groq", "GROQ_API_KEY"),
    ("deepseek", "DEEPSEEK_API_KEY"),
];

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.eir/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/eir/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (providers may use env vars).
    pub fn load() -> Result<Self> {
        // Try user secrets first
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".eir").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        // Try system secrets
        let system_secrets = PathBuf::from("/etc/eir/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        // No secrets file: return empty (providers can fall back to env vars)
        Ok(Secrets::default())
    }

    /// Load a specific secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            EirError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            EirError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            EirError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(EirError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Get API key for a provider, falling back to the corresponding environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        self.from_file(provider).or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
                .filter(|key| !key.trim().is_empty())
        })
    }

    fn from_file(&self, provider: &str) -> Option<String> {
        match provider {
            "huggingface" => self.huggingface.as_ref(),
            "groq" => self.groq.as_ref(),
            "deepseek" => self.deepseek.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone())
    }
}
