use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ModelError, RequestErrorKind};
use crate::models::{ChatModel, ChatModelFactory, ModelReply};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, Debug)]
pub struct OpenAiSettings {
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiChatModel {
    pub fn new(settings: &OpenAiSettings, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build http client")?;
        Ok(Self::with_client(client, settings, api_key))
    }

    fn with_client(client: reqwest::Client, settings: &OpenAiSettings, api_key: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", settings.api_base.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: api_key.to_string(),
        }
    }

    fn body(&self, prompt: &str, temperature: f32) -> Value {
        json!({
            "model": self.model,
            "temperature": temperature,
            "response_format": {"type": "json_object"},
            "messages": [{"role": "user", "content": prompt}],
        })
    }
}

fn classify_status(status: StatusCode, body: &str) -> RequestErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        RequestErrorKind::RateLimited
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        RequestErrorKind::Auth
    } else if status.is_server_error() {
        RequestErrorKind::Server
    } else if body.contains("context_length") || body.contains("maximum context length") {
        RequestErrorKind::ContextTooLong
    } else {
        RequestErrorKind::Other
    }
}

fn reply_content(response: &Value) -> Option<&str> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str, temperature: f32) -> Result<ModelReply, ModelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.body(prompt, temperature))
            .send()
            .await
            .map_err(|e| ModelError::request(RequestErrorKind::Transport, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ModelError::request(RequestErrorKind::Transport, e.to_string()))?;
        if !status.is_success() {
            let kind = classify_status(status, &text);
            let snippet: String = text.chars().take(500).collect();
            return Err(ModelError::request(kind, format!("{status}: {snippet}")));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| ModelError::request(RequestErrorKind::Other, format!("bad response body: {e}")))?;
        let content = reply_content(&parsed)
            .ok_or_else(|| ModelError::OutputFormat("response has no message content".to_string()))?;
        debug!(model = %self.model, chars = content.len(), "model reply");
        ModelReply::parse(content)
    }
}

/// Shares one HTTP client across all credentials.
pub struct OpenAiFactory {
    client: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiFactory {
    pub fn new(settings: OpenAiSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client, settings })
    }
}

impl ChatModelFactory for OpenAiFactory {
    fn create(&self, credential: &str) -> anyhow::Result<Arc<dyn ChatModel>> {
        Ok(Arc::new(OpenAiChatModel::with_client(
            self.client.clone(),
            &self.settings,
            credential,
        )))
    }
}
