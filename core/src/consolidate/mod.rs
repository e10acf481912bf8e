//! Consolidate pipeline: new engrams get their lookup indices and
//! embeddings before the memory announces them complete.

mod prompts;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::event::Topic;
use crate::executor::BoxFuture;
use crate::messages::{
    EngramCompleteMsg, IndexCompleteMsg, IndicesMsg, MetaCompleteMsg, ObservationCompleteMsg,
    StatusMsg,
};
use crate::metrics::MetricsTracker;
use crate::plugin::traits::{EmbedRequest, Embedding, Llm, LlmRequest, Plugin};
use crate::service::{Service, ServiceContext};
use crate::types::{index_node_id, Engram, Index, Meta};
use crate::{EngramError, Result};

const NAME: &str = "consolidate-service";

const OBSERVATIONS_RECEIVED: &str = "observations_received";
const SUMMARIES_GENERATED: &str = "summaries_generated";
const ENGRAMS_CONSOLIDATED: &str = "engrams_consolidated";
const INDICES_GENERATED: &str = "indices_generated";
const EMBEDDINGS_GENERATED: &str = "embeddings_generated";

pub struct ConsolidateService {
    inner: Option<Arc<ConsolidateInner>>,
}

impl Default for ConsolidateService {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolidateService {
    pub fn new() -> Self {
        Self { inner: None }
    }
}

struct ConsolidateInner {
    id: String,
    ctx: Arc<ServiceContext>,
    summary_llm: Plugin<dyn Llm>,
    gen_indices_llm: Plugin<dyn Llm>,
    embedding: Plugin<dyn Embedding>,
    /// In-flight engrams between "observation received" and "indices
    /// embedded". Owned by this service alone.
    engram_builder: DashMap<String, Engram>,
    metrics: MetricsTracker,
}

impl Service for ConsolidateService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let plugins = &ctx.plugins;

        self.inner = Some(Arc::new(ConsolidateInner {
            id: uuid::Uuid::new_v4().to_string(),
            ctx: Arc::clone(ctx),
            summary_llm: plugins.get_llm("summary")?,
            gen_indices_llm: plugins.get_llm("gen_indices")?,
            embedding: plugins.get_embedding("gen_embed")?,
            engram_builder: DashMap::new(),
            metrics: MetricsTracker::new(),
        }));
        Ok(())
    }

    fn start(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let inner = self.inner.clone().ok_or_else(|| {
            EngramError::Invariant("consolidate service not initialized".to_string())
        })?;

        {
            let inner = Arc::clone(&inner);
            ctx.bus
                .subscribe(Topic::ObservationComplete, NAME, move |payload| {
                    inner.on_observation_complete(payload)
                });
        }
        {
            let inner = Arc::clone(&inner);
            ctx.bus.subscribe(Topic::Acknowledge, NAME, move |_payload| {
                inner.on_acknowledge();
                Ok(())
            });
        }
        Ok(())
    }
}

impl ConsolidateInner {
    fn on_observation_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: ObservationCompleteMsg = serde_json::from_value(payload)?;
        self.metrics.increment(OBSERVATIONS_RECEIVED);

        // Two engrams with the same id cannot both be in flight; that is a
        // logic bug upstream, fatal to the run.
        for engram in &msg.observation.engram_list {
            if self.engram_builder.contains_key(&engram.id) {
                let id = engram.id.clone();
                self.ctx.executor.run_background(async move {
                    Err(EngramError::Invariant(format!(
                        "engram id collision during consolidation: {id}"
                    )))
                });
                return Err(EngramError::Invariant(format!(
                    "engram id collision during consolidation: {}",
                    engram.id
                )));
            }
            self.engram_builder
                .insert(engram.id.clone(), engram.clone());
        }

        let summary_task = {
            let inner = Arc::clone(self);
            let meta = msg.observation.meta.clone();
            let rendered = render_observation(&msg.observation);
            let tracking_id = msg.tracking_id.clone();
            let repo_id = msg.repo_id.clone();
            async move {
                inner
                    .generate_summary(meta, rendered, tracking_id, repo_id)
                    .await
            }
        };
        self.ctx.executor.run_task(summary_task);

        let inner = Arc::clone(self);
        self.ctx
            .executor
            .run_task(async move { inner.consolidate_engrams(msg).await });
        Ok(())
    }

    /// Native LLM observations already carry a summary; everything else gets
    /// one generated before the embedding.
    async fn generate_summary(
        &self,
        mut meta: Meta,
        observation_render: String,
        tracking_id: String,
        repo_id: Option<String>,
    ) -> Result<()> {
        if meta.summary_full.text.is_empty() {
            let request = LlmRequest::new(
                "generate_summary",
                prompts::render_summary(&observation_render),
            );
            let response = self
                .summary_llm
                .instance
                .submit(&request, &self.summary_llm.args)
                .await?;
            meta.summary_full.text = response.text;
            self.metrics.increment(SUMMARIES_GENERATED);
        }

        let vectors = self
            .embedding
            .instance
            .gen_embed(
                &EmbedRequest::new(
                    "generate_summary_embeddings",
                    vec![meta.summary_full.text.clone()],
                ),
                &self.embedding.args,
            )
            .await?;
        meta.summary_full.embedding = vectors.into_iter().next();

        self.ctx.publish(
            Topic::MetaComplete,
            serde_json::to_value(MetaCompleteMsg {
                meta,
                tracking_id,
                repo_id,
            })?,
        );
        Ok(())
    }

    async fn consolidate_engrams(self: Arc<Self>, msg: ObservationCompleteMsg) -> Result<()> {
        let engrams = msg.observation.engram_list;
        self.metrics.add(ENGRAMS_CONSOLIDATED, engrams.len() as u64);
        if engrams.is_empty() {
            return Ok(());
        }

        // Phase 1: generate lookup phrases for every engram in parallel.
        let mut index_tasks: Vec<(String, BoxFuture<(String, Vec<String>)>)> = Vec::new();
        for (i, engram) in engrams.iter().enumerate() {
            let inner = Arc::clone(&self);
            let engram_id = engram.id.clone();
            let rendered = engram.render();
            index_tasks.push((
                "gen_indices".to_string(),
                Box::pin(async move { inner.gen_indices(i, engram_id, rendered).await }),
            ));
        }
        let mut gathered = self
            .ctx
            .executor
            .run_tasks(index_tasks)
            .join()
            .await?;
        let index_sets: Vec<(String, Vec<String>)> = gathered
            .take("gen_indices")
            .into_iter()
            .filter_map(|r| r.ok())
            .collect();
        debug!("index sets generated: {}", index_sets.len());

        // Phase 2: embed every phrase batch in parallel and attach the
        // resulting indices.
        let mut embed_tasks: Vec<(String, BoxFuture<String>)> = Vec::new();
        for (i, (engram_id, phrases)) in index_sets.into_iter().enumerate() {
            let inner = Arc::clone(&self);
            let tracking_id = msg.tracking_id.clone();
            let repo_id = msg.repo_id.clone();
            embed_tasks.push((
                "gen_embeddings".to_string(),
                Box::pin(async move {
                    inner
                        .gen_embeddings(i, engram_id, phrases, tracking_id, repo_id)
                        .await
                }),
            ));
        }
        let mut gathered = self
            .ctx
            .executor
            .run_tasks(embed_tasks)
            .join()
            .await?;
        let done_ids: Vec<String> = gathered
            .take("gen_embeddings")
            .into_iter()
            .filter_map(|r| r.ok())
            .collect();

        // Only now, with embeddings in place, are the engrams complete.
        for engram_id in done_ids {
            let Some((_, engram)) = self.engram_builder.remove(&engram_id) else {
                return Err(EngramError::Invariant(format!(
                    "engram {engram_id} missing from the in-flight map"
                )));
            };
            info!("engram complete: {engram_id}");
            self.ctx.publish(
                Topic::EngramComplete,
                serde_json::to_value(EngramCompleteMsg {
                    engram,
                    tracking_id: msg.tracking_id.clone(),
                })?,
            );
        }
        Ok(())
    }

    async fn gen_indices(
        &self,
        index: usize,
        engram_id: String,
        engram_render: String,
    ) -> Result<(String, Vec<String>)> {
        let request = LlmRequest::new("gen_indices", prompts::render_gen_indices(&engram_render))
            .with_schema(serde_json::json!({ "index_text_array": "string[]" }))
            .with_index(index);

        let response = self
            .gen_indices_llm
            .instance
            .submit(&request, &self.gen_indices_llm.args)
            .await?;

        let parsed: Value = serde_json::from_str(&response.text).map_err(|err| {
            EngramError::Backend(format!("generated indices are not valid JSON: {err}"))
        })?;
        let phrases: Vec<String> = parsed
            .get("index_text_array")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .ok_or_else(|| {
                EngramError::Backend("generated indices are missing index_text_array".to_string())
            })?;

        self.metrics.add(INDICES_GENERATED, phrases.len() as u64);
        Ok((engram_id, phrases))
    }

    async fn gen_embeddings(
        &self,
        index: usize,
        engram_id: String,
        phrases: Vec<String>,
        tracking_id: String,
        repo_id: Option<String>,
    ) -> Result<String> {
        let vectors = self
            .embedding
            .instance
            .gen_embed(
                &EmbedRequest::new("gen_embeddings", phrases.clone()).with_index(index),
                &self.embedding.args,
            )
            .await?;
        self.metrics.add(EMBEDDINGS_GENERATED, vectors.len() as u64);

        let index_array: Vec<Index> = phrases
            .iter()
            .zip(vectors)
            .map(|(text, embedding)| Index::with_embedding(text.clone(), embedding))
            .collect();
        let index_id_array: Vec<String> = phrases
            .iter()
            .map(|text| index_node_id(&engram_id, text))
            .collect();

        let (locations, engram_type) = {
            let Some(mut entry) = self.engram_builder.get_mut(&engram_id) else {
                return Err(EngramError::Invariant(format!(
                    "engram {engram_id} missing from the in-flight map"
                )));
            };
            entry.indices = Some(index_array.clone());
            (
                entry.locations.clone(),
                if entry.is_native_source {
                    "native".to_string()
                } else {
                    "derived".to_string()
                },
            )
        };

        self.ctx.publish(
            Topic::IndicesCreated,
            serde_json::to_value(IndicesMsg {
                parent_id: engram_id.clone(),
                index_id_array: index_id_array.clone(),
                tracking_id: tracking_id.clone(),
            })?,
        );
        self.ctx.publish(
            Topic::IndexComplete,
            serde_json::to_value(IndexCompleteMsg {
                engram_id: engram_id.clone(),
                index: index_array,
                index_id_array,
                tracking_id,
                repo_id,
                locations,
                engram_type,
            })?,
        );
        Ok(engram_id)
    }

    fn on_acknowledge(&self) {
        let packet = self.metrics.get_and_reset_packet();
        self.ctx.publish(
            Topic::Status,
            serde_json::to_value(StatusMsg {
                id: self.id.clone(),
                name: NAME.to_string(),
                timestamp: chrono::Utc::now().timestamp(),
                metrics: packet,
            })
            .unwrap_or_default(),
        );
    }
}

fn render_observation(observation: &crate::types::Observation) -> String {
    let mut out = String::new();
    for engram in &observation.engram_list {
        out.push_str(&engram.render());
    }
    out
}
