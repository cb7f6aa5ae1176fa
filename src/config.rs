//! Remote endpoint configuration, read from the process environment.

use std::fmt;
use std::time::Duration;

pub const BASE_URL_ENV: &str = "TACHYON_BASE_URL";
pub const API_KEY_ENV: &str = "TACHYON_API_KEY";
pub const MODEL_ENV: &str = "TACHYON_MODEL";
pub const CHAT_PATH_ENV: &str = "TACHYON_CHAT_PATH";
pub const TIMEOUT_ENV: &str = "TACHYON_TIMEOUT_SECS";

/// Default request path for OpenAI-style chat completions
pub const DEFAULT_CHAT_PATH: &str = "/v1/chat/completions";
/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required env var(s): {0}")]
    MissingEnv(String),
    #[error("Invalid TACHYON_TIMEOUT_SECS value '{0}': expected a whole number of seconds")]
    InvalidTimeout(String),
}

/// Connection settings for the chat-completion endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Endpoint base, without a trailing slash
    pub base_url: String,
    /// Bearer credential
    pub api_key: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Request path, always starting with `/`
    pub chat_path: String,
    pub timeout_secs: u64,
}

impl RemoteConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    ///
    /// Values are trimmed and an empty value counts as unset. Every missing
    /// required variable is reported in a single error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        let base_url = read(BASE_URL_ENV);
        let api_key = read(API_KEY_ENV);
        let model = read(MODEL_ENV);

        let missing: Vec<&str> = [
            (BASE_URL_ENV, &base_url),
            (API_KEY_ENV, &api_key),
            (MODEL_ENV, &model),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| key)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnv(missing.join(", ")));
        }

        let chat_path = match read(CHAT_PATH_ENV) {
            path if path.is_empty() => DEFAULT_CHAT_PATH.to_string(),
            path if path.starts_with('/') => path,
            path => format!("/{path}"),
        };

        let timeout_raw = read(TIMEOUT_ENV);
        let timeout_secs = if timeout_raw.is_empty() {
            DEFAULT_TIMEOUT_SECS
        } else {
            timeout_raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(timeout_raw.clone()))?
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            chat_path,
            timeout_secs,
        })
    }

    /// Full URL of the chat endpoint
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("chat_path", &self.chat_path)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
