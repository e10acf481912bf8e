//! Retrieve pipeline: prompt in, candidate engram ids out.

mod ask;
mod prompts;

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::event::Topic;
use crate::messages::{IndexCompleteMsg, IndicesMsg, MetaCompleteMsg, StatusMsg};
use crate::metrics::MetricsTracker;
use crate::plugin::traits::{Collection, Embedding, Llm, Plugin, VectorDb, VectorFilters};
use crate::repository::{HistoryRepository, MetaRepository};
use crate::service::{Service, ServiceContext};
use crate::types::{Prompt, NULL_REPO};
use crate::{EngramError, Result};

pub use ask::Ask;

const NAME: &str = "retrieve-service";

const PROMPTS_SUBMITTED: &str = "prompts_submitted";
const INDEX_COMPLETED: &str = "index_completed";
const EMBEDDINGS_ADDED_TO_VECTOR: &str = "embeddings_added_to_vector";
const META_SUMMARIES_INDEXED: &str = "meta_summaries_indexed";

/// Turns a prompt into candidate engram ids, and owns the write side of the
/// vector store: finished indices and meta summaries land here to be
/// inserted, after which `indices_inserted` closes the progress loop.
pub struct RetrieveService {
    inner: Option<Arc<RetrieveInner>>,
}

impl Default for RetrieveService {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrieveService {
    pub fn new() -> Self {
        Self { inner: None }
    }
}

pub(crate) struct RetrieveInner {
    pub(crate) id: String,
    pub(crate) ctx: Arc<ServiceContext>,
    pub(crate) direction_llm: Plugin<dyn Llm>,
    pub(crate) analysis_llm: Plugin<dyn Llm>,
    pub(crate) gen_index_llm: Plugin<dyn Llm>,
    pub(crate) embedding: Plugin<dyn Embedding>,
    pub(crate) vector_db: Plugin<dyn VectorDb>,
    pub(crate) meta_repository: Arc<MetaRepository>,
    pub(crate) history_repository: Arc<HistoryRepository>,
    pub(crate) metrics: MetricsTracker,
}

impl Service for RetrieveService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let plugins = &ctx.plugins;
        let db = plugins.get_db("document")?;

        self.inner = Some(Arc::new(RetrieveInner {
            id: uuid::Uuid::new_v4().to_string(),
            ctx: Arc::clone(ctx),
            direction_llm: plugins.get_llm("retrieve_gen_conversation_direction")?,
            analysis_llm: plugins.get_llm("retrieve_prompt_analysis")?,
            gen_index_llm: plugins.get_llm("retrieve_gen_index")?,
            embedding: plugins.get_embedding("gen_embed")?,
            vector_db: plugins.get_vector_db("db")?,
            meta_repository: Arc::new(MetaRepository::new(db.clone())),
            history_repository: Arc::new(HistoryRepository::new(db)),
            metrics: MetricsTracker::new(),
        }));
        Ok(())
    }

    fn start(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let inner = self
            .inner
            .clone()
            .ok_or_else(|| EngramError::Invariant("retrieve service not initialized".to_string()))?;

        {
            let inner = Arc::clone(&inner);
            ctx.bus.subscribe(Topic::SubmitPrompt, NAME, move |payload| {
                let prompt: Prompt = serde_json::from_value(payload)?;
                inner.submit(prompt);
                Ok(())
            });
        }
        {
            let inner = Arc::clone(&inner);
            ctx.bus.subscribe(Topic::IndexComplete, NAME, move |payload| {
                inner.on_index_complete(payload)
            });
        }
        {
            let inner = Arc::clone(&inner);
            ctx.bus.subscribe(Topic::MetaComplete, NAME, move |payload| {
                inner.on_meta_complete(payload)
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

impl RetrieveInner {
    pub(crate) fn submit(self: &Arc<Self>, prompt: Prompt) {
        self.metrics.increment(PROMPTS_SUBMITTED);

        self.ctx.publish(
            Topic::PromptCreated,
            json!({
                "id": prompt.prompt_id,
                "parent_id": prompt.parent_id,
                "tracking_id": prompt.tracking_id,
            }),
        );

        let ask = Ask::new(Arc::clone(self), prompt);
        self.ctx.executor.run_task(async move { ask.get_sources().await });
    }

    fn on_index_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: IndexCompleteMsg = serde_json::from_value(payload)?;
        self.metrics.increment(INDEX_COMPLETED);

        let inner = Arc::clone(self);
        self.ctx
            .executor
            .run_task(async move { inner.insert_vectors(msg).await });
        Ok(())
    }

    async fn insert_vectors(&self, msg: IndexCompleteMsg) -> Result<()> {
        let filters = VectorFilters {
            repo_ids: vec![msg.repo_id.clone().unwrap_or_else(|| NULL_REPO.to_string())],
            types: vec![msg.engram_type.clone()],
            locations: msg.locations.clone(),
        };

        self.vector_db
            .instance
            .insert(Collection::Main, &msg.index, &msg.engram_id, &filters)
            .await?;
        self.metrics.add(EMBEDDINGS_ADDED_TO_VECTOR, msg.index.len() as u64);

        self.ctx.publish(
            Topic::IndicesInserted,
            serde_json::to_value(IndicesMsg {
                parent_id: msg.engram_id,
                index_id_array: msg.index_id_array,
                tracking_id: msg.tracking_id,
            })?,
        );
        Ok(())
    }

    fn on_meta_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: MetaCompleteMsg = serde_json::from_value(payload)?;
        if msg.meta.summary_full.embedding.is_none() {
            warn!("meta {} completed without a summary embedding", msg.meta.id);
            return Ok(());
        }

        let inner = Arc::clone(self);
        self.ctx.executor.run_task(async move {
            let filters = VectorFilters {
                repo_ids: vec![msg.repo_id.clone().unwrap_or_else(|| NULL_REPO.to_string())],
                types: Vec::new(),
                locations: msg.meta.locations.clone(),
            };
            inner
                .vector_db
                .instance
                .insert(
                    Collection::Meta,
                    &[msg.meta.summary_full.clone()],
                    &msg.meta.id,
                    &filters,
                )
                .await?;
            inner.metrics.increment(META_SUMMARIES_INDEXED);
            Ok(())
        });
        Ok(())
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
