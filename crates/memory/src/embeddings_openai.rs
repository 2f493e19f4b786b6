/// Embeddings over the OpenAI-compatible `/v1/embeddings` endpoint (OpenAI, Ollama, LM Studio).
use std::time::Duration;

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    gqlrag_common::http,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::embeddings::EmbeddingProvider;

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: Option<Secret<String>>,
    endpoint: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(base_url: &str, model: impl Into<String>, dims: usize) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(60))?,
            api_key: None,
            endpoint: http::openai_endpoint(base_url, "embeddings"),
            model: model.into(),
            dims,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<Secret<String>>) -> Self {
        self.api_key = api_key;
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

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = texts.len(), "requesting embeddings");

        let mut req = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }

        let mut resp = req
            .send()
            .await
            .with_context(|| format!("embedding request to {} failed", self.endpoint))?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await
            .context("malformed embedding response")?;

        if resp.data.len() != texts.len() {
            bail!(
                "embedding response has {} vectors for {} inputs",
                resp.data.len(),
                texts.len()
            );
        }
        resp.data.sort_by_key(|d| d.index);
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
