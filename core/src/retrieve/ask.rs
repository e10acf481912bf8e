use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::event::Topic;
use crate::messages::RetrieveCompleteMsg;
use crate::plugin::traits::{Collection, EmbedRequest, LlmRequest, VectorFilters};
use crate::retrieve::{prompts, RetrieveInner};
use crate::types::{ConversationDirection, Meta, Prompt, PromptAnalysis, RetrieveResult};
use crate::{EngramError, Result};

const HISTORY_LIMIT: usize = 3;

/// One retrieval pass. The stages run straight-line: conversation
/// direction, coarse meta lookup, then prompt analysis and index generation
/// side by side, and finally the main vector query.
pub struct Ask {
    id: String,
    prompt: Prompt,
    service: Arc<RetrieveInner>,
}

impl Ask {
    pub(crate) fn new(service: Arc<RetrieveInner>, prompt: Prompt) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt,
            service,
        }
    }

    pub async fn get_sources(self) -> Result<()> {
        let service = &self.service;
        let repo_filters = VectorFilters {
            repo_ids: self.prompt.effective_repo_filters(),
            ..Default::default()
        };

        // 1. Where is the conversation going?
        let direction = self.gen_conversation_direction().await?;
        info!("conversation direction: {}", direction.user_intent);

        // 2. Coarse lookup: which metas are in the neighborhood of the
        // user's intent?
        let intent_embedding = service
            .embedding
            .instance
            .gen_embed(
                &EmbedRequest::new("gen_conversation_direction", vec![direction.user_intent.clone()]),
                &service.embedding.args,
            )
            .await?;
        let intent_vector = intent_embedding.first().ok_or_else(|| {
            EngramError::Backend("embedding backend returned no vectors".to_string())
        })?;
        let meta_ids = service
            .vector_db
            .instance
            .query(
                Collection::Meta,
                intent_vector,
                &repo_filters,
                &service.vector_db.args,
            )
            .await?;

        // 3. The metas become domain hints for the next two calls.
        let metas = service.meta_repository.load_batch(&meta_ids).await?;

        // 4. Analyze the prompt and generate dynamic indices in parallel.
        let (analysis, phrases) =
            tokio::join!(self.analyze_prompt(&metas), self.generate_indices(&metas));
        let mut analysis = analysis?;
        let phrases = phrases?;
        analysis.indices = phrases.clone();

        // 5. Embed the generated phrases, order preserved.
        let phrase_embeddings = if phrases.is_empty() {
            Vec::new()
        } else {
            service
                .embedding
                .instance
                .gen_embed(
                    &EmbedRequest::new("generate_indices", phrases.clone()),
                    &service.embedding.args,
                )
                .await?
        };

        // 6. Union of per-phrase hits, first-seen order so recorded runs
        // replay byte for byte.
        let mut engram_ids: Vec<String> = Vec::new();
        for embedding in &phrase_embeddings {
            let ids = service
                .vector_db
                .instance
                .query(
                    Collection::Main,
                    embedding,
                    &repo_filters,
                    &service.vector_db.args,
                )
                .await?;
            for id in ids {
                if !engram_ids.contains(&id) {
                    engram_ids.push(id);
                }
            }
        }
        debug!("retrieval found {} candidate engrams", engram_ids.len());

        // 7. Hand off to response generation.
        let retrieve_result = RetrieveResult {
            ask_id: self.id.clone(),
            engram_id_array: engram_ids,
            conversation_direction: direction,
        };
        service.ctx.publish(
            Topic::RetrieveComplete,
            serde_json::to_value(RetrieveCompleteMsg {
                ask_id: self.id.clone(),
                prompt: self.prompt.clone(),
                analysis,
                retrieve_result,
            })?,
        );
        Ok(())
    }

    async fn gen_conversation_direction(&self) -> Result<ConversationDirection> {
        let history = self
            .service
            .history_repository
            .recent(HISTORY_LIMIT)
            .await
            .unwrap_or_default();

        let request = LlmRequest::new(
            "gen_conversation_direction",
            prompts::render_direction(&self.prompt, &history),
        )
        .with_schema(json!({
            "user_intent": "string",
            "working_memory": "object",
            "perform_research": "bool"
        }));

        let plugin = &self.service.direction_llm;
        let response = plugin.instance.submit(&request, &plugin.args).await?;
        serde_json::from_str(&response.text).map_err(|err| {
            EngramError::Backend(format!("conversation direction is not valid JSON: {err}"))
        })
    }

    async fn analyze_prompt(&self, metas: &[Meta]) -> Result<PromptAnalysis> {
        let request = LlmRequest::new(
            "analyze_prompt",
            prompts::render_analysis(&self.prompt, metas),
        )
        .with_schema(json!({
            "response_length": "string",
            "user_prompt_type": "string"
        }));

        let plugin = &self.service.analysis_llm;
        let response = plugin.instance.submit(&request, &plugin.args).await?;
        serde_json::from_str(&response.text).map_err(|err| {
            EngramError::Backend(format!("prompt analysis is not valid JSON: {err}"))
        })
    }

    async fn generate_indices(&self, metas: &[Meta]) -> Result<Vec<String>> {
        let request = LlmRequest::new(
            "generate_indices",
            prompts::render_gen_indices(&self.prompt, metas),
        )
        .with_schema(json!({ "index_text_array": "string[]" }));

        let plugin = &self.service.gen_index_llm;
        let response = plugin.instance.submit(&request, &plugin.args).await?;

        let parsed: serde_json::Value = serde_json::from_str(&response.text).map_err(|err| {
            EngramError::Backend(format!("generated indices are not valid JSON: {err}"))
        })?;
        let phrases = parsed
            .get("index_text_array")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                EngramError::Backend("generated indices are missing index_text_array".to_string())
            })?;

        Ok(phrases
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect())
    }
}
