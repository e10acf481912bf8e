use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::plugin::recording::Recorder;
use crate::plugin::traits::{Llm, LlmRequest, LlmResponse, PluginArgs};
use crate::plugins::fixtures;
use crate::stream::{StreamPacket, StreamSink};
use crate::{EngramError, Result};

/// Deterministic LLM. Answers from recorded data when a recording is
/// loaded, otherwise from the built-in fixtures, keyed by the usage slot
/// the call came through.
pub struct MockLlm {
    recorder: Arc<Recorder>,
}

impl MockLlm {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder }
    }

    fn canned(&self, usage: &str, request: &LlmRequest) -> Result<String> {
        let text = match usage {
            "retrieve_gen_conversation_direction" => fixtures::conversation_direction().to_string(),
            "retrieve_prompt_analysis" => fixtures::prompt_analysis().to_string(),
            "retrieve_gen_index" => {
                json!({ "index_text_array": fixtures::RETRIEVE_INDEX_PHRASES }).to_string()
            }
            "response_main" => fixtures::main_response_text(),
            "validate" => fixtures::validate_toml(),
            "summary" => fixtures::meta_summary_text().to_string(),
            "gen_indices" => {
                json!({ "index_text_array": fixtures::CONSOLIDATE_INDEX_PHRASES }).to_string()
            }
            "sense_initial_summary" => fixtures::initial_scan().to_string(),
            "sense_scan" => fixtures::page_markup(request.index),
            "sense_full_summary" => fixtures::full_summary().to_string(),
            other => {
                return Err(EngramError::Backend(format!(
                    "mock llm has no canned response for usage '{other}'"
                )))
            }
        };
        Ok(text)
    }

    fn respond(&self, request: &LlmRequest, args: &PluginArgs) -> Result<String> {
        let usage = args.get("usage").and_then(|v| v.as_str()).unwrap_or("");
        let key = Recorder::key(request.caller, usage, request.index);

        debug!("mock llm call {key}: {:.40}...", request.prompt);

        let text = match self.recorder.lookup(&key) {
            Some(Value::String(recorded)) => recorded,
            Some(other) => other.to_string(),
            None => self.canned(usage, request)?,
        };
        self.recorder.record(key, Value::from(text.clone()));
        Ok(text)
    }
}

#[async_trait]
impl Llm for MockLlm {
    async fn submit(&self, request: &LlmRequest, args: &PluginArgs) -> Result<LlmResponse> {
        Ok(LlmResponse {
            text: self.respond(request, args)?,
            model: Some("mock-llm".to_string()),
        })
    }

    async fn submit_streaming(
        &self,
        request: &LlmRequest,
        args: &PluginArgs,
        sink: Arc<dyn StreamSink>,
    ) -> Result<LlmResponse> {
        let text = self.respond(request, args)?;

        let chunks = fixtures::MAIN_RESPONSE_CHUNKS;
        if text == fixtures::main_response_text() {
            for (i, chunk) in chunks.iter().enumerate() {
                if i + 1 == chunks.len() {
                    sink.send(StreamPacket::terminal(*chunk, "end"));
                } else {
                    sink.send(StreamPacket::fragment(*chunk));
                }
            }
        } else {
            sink.send(StreamPacket::terminal(text.clone(), "end"));
        }

        Ok(LlmResponse {
            text,
            model: Some("mock-llm".to_string()),
        })
    }
}
