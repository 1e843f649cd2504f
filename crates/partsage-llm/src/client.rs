use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

use partsage_core::config::LlmSettings;
use partsage_core::error::LlmError;
use partsage_core::traits::LlmCaller;
use partsage_core::types::{Completion, Prompt, SchemaHint};

use crate::wire::{parse_completion, ChatRequest};

/// Chat client for DeepSeek and other OpenAI-compatible endpoints.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let timeout = settings.timeout();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            timeout,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout { timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX) }
        } else {
            LlmError::Unavailable(e.to_string())
        }
    }
}

/// Maps a non-success status to the caller-facing error.
pub fn error_for_status(status: StatusCode, body: &str) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth,
        _ => {
            let snippet: String = body.chars().take(200).collect();
            LlmError::Unavailable(format!("API returned {status}: {snippet}"))
        }
    }
}

#[async_trait]
impl LlmCaller for ChatClient {
    async fn complete(&self, prompt: &Prompt, schema: Option<&SchemaHint>) -> Result<Completion, LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::Auth);
        }
        let request = ChatRequest::from_prompt(&self.model, prompt, schema);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        if !status.is_success() {
            let err = error_for_status(status, &body);
            warn!(%status, error = %err, "chat completion failed");
            return Err(err);
        }
        debug!(model = %self.model, structured = schema.is_some(), bytes = body.len(), "chat completion received");
        parse_completion(&body, schema.is_some())
    }
}
