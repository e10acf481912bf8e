use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::plugin::traits::{EmbedRequest, Embedding, PluginArgs};
use crate::plugins::llm::OpenAiConfig;
use crate::{EngramError, Result};

/// Embeddings over the OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedding {
    http: Client,
    cfg: OpenAiConfig,
}

impl OpenAiEmbedding {
    pub fn new(cfg: OpenAiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|err| EngramError::Backend(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::default())
    }
}

#[async_trait]
impl Embedding for OpenAiEmbedding {
    async fn gen_embed(&self, request: &EmbedRequest, args: &PluginArgs) -> Result<Vec<Vec<f32>>> {
        let model = args
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("text-embedding-3-small");

        let url = format!("{}/embeddings", self.cfg.base_url.trim_end_matches('/'));
        debug!(target: "openai_embedding", "POST {url} model={model} inputs={}", request.strings.len());

        let mut req = self.http.post(&url).header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .json(&json!({ "model": model, "input": request.strings }))
            .send()
            .await
            .map_err(|err| EngramError::Backend(format!("embeddings HTTP error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target: "openai_embedding", %status, body = %text, "embeddings error");
            return Err(EngramError::Backend(format!(
                "embeddings error: status={status} body={text}"
            )));
        }

        let val: Value = resp
            .json()
            .await
            .map_err(|err| EngramError::Backend(format!("failed to parse embeddings JSON: {err}")))?;

        let data = val
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| EngramError::Backend("missing data array in embeddings".to_string()))?;

        // One vector per input, order preserved by the API contract.
        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding: Vec<f32> = item
                .get("embedding")
                .and_then(|e| serde_json::from_value(e.clone()).ok())
                .ok_or_else(|| {
                    EngramError::Backend("malformed embedding entry in response".to_string())
                })?;
            vectors.push(embedding);
        }

        if vectors.len() != request.strings.len() {
            return Err(EngramError::Backend(format!(
                "expected {} embeddings, got {}",
                request.strings.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}
