//! Chat completions over the OpenAI-compatible `/v1/chat/completions`
//! endpoint (OpenAI, Ollama, LM Studio, vLLM).
//!
//! The agent loop speaks plain text, so the whole prompt goes out as a single
//! user message and only the text content of the first choice comes back.

use std::time::Duration;

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    gqlrag_common::http,
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use crate::model::LlmProvider;

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: Option<Secret<String>>,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: &str, model: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(120))?,
            api_key: None,
            endpoint: http::openai_endpoint(base_url, "chat/completions"),
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<Secret<String>>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        self.client = http::build_client(timeout)?;
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request body for a single-prompt completion.
pub fn chat_request_body(
    model: &str,
    prompt: &str,
    temperature: f32,
    max_tokens: Option<u32>,
    stop: &[String],
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": temperature,
        "stream": false,
    });
    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if !stop.is_empty() {
        body["stop"] = serde_json::json!(stop);
    }
    body
}

/// Text of the first choice. Content may be a plain string or, for some
/// servers, an array of `{ "type": "text", "text": ... }` parts.
pub fn parse_message_content(response: &serde_json::Value) -> Option<String> {
    let content = &response["choices"][0]["message"]["content"];
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    let parts = content.as_array()?;
    let text: String = parts
        .iter()
        .filter(|p| p["type"].as_str().is_none_or(|t| t == "text"))
        .filter_map(|p| p["text"].as_str())
        .collect();
    Some(text)
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, stop: &[String]) -> anyhow::Result<String> {
        let body = chat_request_body(
            &self.model,
            prompt,
            self.temperature,
            self.max_tokens,
            stop,
        );
        debug!(model = %self.model, prompt_len = prompt.len(), "chat completion request");

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("chat completion request to {} failed", self.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("{} returned {status}: {text}", self.endpoint);
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .context("chat completion response is not JSON")?;
        parse_message_content(&value)
            .ok_or_else(|| anyhow::anyhow!("chat completion response has no message content"))
    }
}
