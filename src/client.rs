//! Minimal chat-completions client
//!
//! Talks to an OpenAI-style endpoint:
//! `POST {TACHYON_BASE_URL}{TACHYON_CHAT_PATH}` with
//! `Authorization: Bearer {TACHYON_API_KEY}`. One attempt per call, bounded by
//! the configured timeout; failures are surfaced, never retried.

use crate::config::{ConfigError, RemoteConfig};
use crate::log_debug;
use crate::prompt::ChatMessage;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Map, Value, json};

/// Response bodies quoted in errors are cut to this many characters
pub const MAX_ERROR_BODY_CHARS: usize = 2000;

/// Errors from the remote model endpoint
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Tachyon request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Tachyon HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected Tachyon response shape: {0}")]
    UnexpectedShape(String),
}

/// Client for one configured chat-completion endpoint
pub struct TachyonClient {
    config: RemoteConfig,
    http: Client,
}

impl TachyonClient {
    /// Creates a client whose requests time out after the configured duration
    pub fn new(config: RemoteConfig) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { config, http })
    }

    /// Builds a client straight from the environment
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(RemoteConfig::from_env()?)
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Send the conversation and return the generated text
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, ClientError> {
        self.chat_with_extra(messages, temperature, max_tokens, None)
            .await
    }

    /// Like [`TachyonClient::chat`], with extra top-level body fields merged in
    #[tracing::instrument(skip_all, fields(model = %self.config.model, max_tokens = max_tokens))]
    pub async fn chat_with_extra(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
        extra_body: Option<&Map<String, Value>>,
    ) -> Result<String, ClientError> {
        let url = self.config.endpoint();
        let body = request_body(
            &self.config.model,
            messages,
            temperature,
            max_tokens,
            extra_body,
        );

        log_debug!(
            "POST {} (model={}, messages={}, max_tokens={})",
            url,
            self.config.model,
            messages.len(),
            max_tokens
        );

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        log_debug!("Tachyon responded with {} ({} bytes)", status, text.len());

        if status.as_u16() >= 400 {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: truncate_chars(&text, MAX_ERROR_BODY_CHARS).to_string(),
            });
        }

        extract_content(&text)
    }
}

fn request_body(
    model: &str,
    messages: &[ChatMessage],
    temperature: f64,
    max_tokens: u32,
    extra_body: Option<&Map<String, Value>>,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });

    if let Some(extra) = extra_body
        && let Some(object) = body.as_object_mut()
    {
        for (key, value) in extra {
            object.insert(key.clone(), value.clone());
        }
    }

    body
}

/// Pull `choices[0].message.content` out of a response body
fn extract_content(text: &str) -> Result<String, ClientError> {
    let unexpected =
        || ClientError::UnexpectedShape(truncate_chars(text, MAX_ERROR_BODY_CHARS).to_string());

    let data: Value = serde_json::from_str(text).map_err(|_| unexpected())?;
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(unexpected)
}

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(i, _)| &text[..i])
}
