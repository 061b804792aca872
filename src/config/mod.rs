use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

/// Connection and retry settings for [`crate::services::client::ImgGoClient`].
///
/// Loaded from `IMGGO_*` environment variables by [`ClientConfig::from_env`],
/// or built directly with [`ClientConfig::new`].
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClientConfig {
    /// ImgGo API key, sent as a bearer token.
    #[garde(length(min = 1))]
    pub api_key: String,

    /// API base URL without trailing slash (e.g., "https://img-go.com/api").
    #[serde(default = "default_base_url")]
    #[garde(custom(http_url))]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    #[garde(range(min = 1))]
    pub timeout_secs: u64,

    /// Retries after the first attempt for submissions.
    #[serde(default = "default_max_retries")]
    #[garde(range(max = 10))]
    pub max_retries: u32,

    /// First backoff delay in milliseconds; doubles on every retry.
    #[serde(default = "default_backoff_base_ms")]
    #[garde(range(min = 1))]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay in milliseconds. Must cover the
    /// last doubled delay so every retry waits longer than the one before.
    #[serde(default = "default_backoff_max_ms")]
    #[garde(custom(covers_backoff(self.backoff_base_ms, self.max_retries)))]
    pub backoff_max_ms: u64,

    /// Wait applied to HTTP 429 responses that carry no `Retry-After`.
    #[serde(default = "default_rate_limit_wait_secs")]
    #[garde(skip)]
    pub rate_limit_wait_secs: u64,

    /// Retries of a status lookup that answers 404.
    #[serde(default = "default_not_found_retries")]
    #[garde(range(max = 10))]
    pub not_found_retries: u32,

    /// Fixed wait between 404 status lookups in milliseconds.
    #[serde(default = "default_not_found_wait_ms")]
    #[garde(skip)]
    pub not_found_wait_ms: u64,

    /// Default number of status polls before giving up.
    #[serde(default = "default_poll_max_attempts")]
    #[garde(range(min = 1))]
    pub poll_max_attempts: u32,

    /// Default seconds between status polls.
    #[serde(default = "default_poll_interval_secs")]
    #[garde(skip)]
    pub poll_interval_secs: u64,
}

fn default_base_url() -> String {
    "https://img-go.com/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_rate_limit_wait_secs() -> u64 {
    60
}

fn default_not_found_retries() -> u32 {
    3
}

fn default_not_found_wait_ms() -> u64 {
    2_000
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn http_url(value: &str, _ctx: &()) -> garde::Result {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(garde::Error::new("must be an http(s) URL"))
    }
}

fn covers_backoff(base_ms: u64, max_retries: u32) -> impl FnOnce(&u64, &()) -> garde::Result {
    move |max_ms, _| {
        let last = base_ms.saturating_mul(1u64 << max_retries.saturating_sub(1).min(63));
        if *max_ms >= last {
            Ok(())
        } else {
            Err(garde::Error::new(format!(
                "must be at least {last} ms for {max_retries} retries starting at {base_ms} ms"
            )))
        }
    }
}

impl ClientConfig {
    /// Config with every setting at its default except the API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            rate_limit_wait_secs: default_rate_limit_wait_secs(),
            not_found_retries: default_not_found_retries(),
            not_found_wait_ms: default_not_found_wait_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config: Self = envy::prefixed("IMGGO_").from_env()?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Settings for the webhook receiver binary.
#[derive(Debug, Deserialize, Validate)]
pub struct WebhookServerConfig {
    /// Server bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// Shared secret registered with `POST /webhooks`.
    #[garde(length(min = 16))]
    pub webhook_secret: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

impl WebhookServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::prefixed("IMGGO_").from_env()?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}
