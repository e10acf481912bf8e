use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::plugin::traits::{Llm, LlmRequest, LlmResponse, PluginArgs};
use crate::stream::{StreamPacket, StreamSink};
use crate::{EngramError, Result};

/// Configuration for the OpenAI-compatible backend, loaded from environment
/// variables so the same profile works against any compatible server.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60_000),
            temperature: std::env::var("OPENAI_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.7),
        }
    }
}

/// HTTP chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiLlm {
    http: Client,
    cfg: OpenAiConfig,
}

impl OpenAiLlm {
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

    async fn chat(&self, request: &LlmRequest, args: &PluginArgs) -> Result<LlmResponse> {
        let model = args
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("gpt-4o-mini");

        let mut prompt = request.prompt.clone();
        if let Some(schema) = &request.structured_schema {
            // Constrain the decode by spelling the expected fields out; the
            // response is parsed, not trusted.
            prompt.push_str(&format!(
                "\n\nRespond with JSON matching exactly these fields: {schema}"
            ));
        }

        let content: Value = if request.images.is_empty() {
            Value::from(prompt)
        } else {
            let mut parts = vec![json!({ "type": "text", "text": prompt })];
            for image in &request.images {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/png;base64,{image}") }
                }));
            }
            Value::Array(parts)
        };

        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        debug!(target: "openai_llm", "POST {url} model={model}");

        let mut req = self.http.post(&url).header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": self.cfg.temperature,
        });

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|err| EngramError::Backend(format!("chat completions HTTP error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target: "openai_llm", %status, body = %text, "chat completions error");
            return Err(EngramError::Backend(format!(
                "chat completions error: status={status} body={text}"
            )));
        }

        let val: Value = resp
            .json()
            .await
            .map_err(|err| EngramError::Backend(format!("failed to parse completions JSON: {err}")))?;

        let text = val
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                EngramError::Backend("missing choices[0].message.content in completion".to_string())
            })?;

        Ok(LlmResponse {
            text: super::strip_code_fences(text),
            model: val
                .get("model")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }
}

#[async_trait]
impl Llm for OpenAiLlm {
    async fn submit(&self, request: &LlmRequest, args: &PluginArgs) -> Result<LlmResponse> {
        self.chat(request, args).await
    }

    async fn submit_streaming(
        &self,
        request: &LlmRequest,
        args: &PluginArgs,
        sink: Arc<dyn StreamSink>,
    ) -> Result<LlmResponse> {
        // TODO: switch to the server-sent events stream instead of chunking
        // the finished completion.
        let response = self.chat(request, args).await?;

        let mut words = response.text.split_inclusive(' ').peekable();
        while let Some(word) = words.next() {
            if words.peek().is_some() {
                sink.send(StreamPacket::fragment(word));
            } else {
                sink.send(StreamPacket::terminal(word, "end"));
            }
        }

        Ok(response)
    }
}
