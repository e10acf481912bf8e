//! Codify pipeline: validate an answer against its sources and distill the
//! memorable part into a new observation.

mod prompts;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::event::Topic;
use crate::messages::{
    EngramsCreatedMsg, MainPromptCompleteMsg, NodeCreatedMsg, ObservationCompleteMsg,
    ProgressUpdatedMsg, StatusMsg,
};
use crate::metrics::MetricsTracker;
use crate::plugin::traits::{Llm, LlmRequest, Plugin};
use crate::plugins::llm::strip_code_fences;
use crate::repository::{EngramRepository, MetaRepository, ObservationRepository};
use crate::service::{Service, ServiceContext};
use crate::{EngramError, Result};

const NAME: &str = "codify-service";

/// Engrams scoring at or below these gates do not survive the merge.
pub const ACCURACY_CONSTANT: u8 = 3;
pub const RELEVANCY_CONSTANT: u8 = 3;

const RESPONSES_RECEIVED: &str = "responses_received";
const ENGRAMS_FETCHED: &str = "engrams_fetched";
const RESPONSES_VALIDATED: &str = "responses_validated";
const NOT_MEMORABLE: &str = "not_memorable";

pub struct CodifyService {
    inner: Option<Arc<CodifyInner>>,
}

impl Default for CodifyService {
    fn default() -> Self {
        Self::new()
    }
}

impl CodifyService {
    pub fn new() -> Self {
        Self { inner: None }
    }
}

struct CodifyInner {
    id: String,
    ctx: Arc<ServiceContext>,
    validate_llm: Plugin<dyn Llm>,
    engram_repository: Arc<EngramRepository>,
    meta_repository: Arc<MetaRepository>,
    metrics: MetricsTracker,
}

impl Service for CodifyService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let plugins = &ctx.plugins;
        let db = plugins.get_db("document")?;

        self.inner = Some(Arc::new(CodifyInner {
            id: uuid::Uuid::new_v4().to_string(),
            ctx: Arc::clone(ctx),
            validate_llm: plugins.get_llm("validate")?,
            engram_repository: Arc::new(EngramRepository::new(db.clone())),
            meta_repository: Arc::new(MetaRepository::new(db)),
            metrics: MetricsTracker::new(),
        }));
        Ok(())
    }

    fn start(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let inner = self
            .inner
            .clone()
            .ok_or_else(|| EngramError::Invariant("codify service not initialized".to_string()))?;

        {
            let inner = Arc::clone(&inner);
            ctx.bus
                .subscribe(Topic::MainPromptComplete, NAME, move |payload| {
                    inner.on_prompt_complete(payload)
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

impl CodifyInner {
    fn on_prompt_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: MainPromptCompleteMsg = serde_json::from_value(payload)?;
        self.metrics.increment(RESPONSES_RECEIVED);

        if !msg.training_mode {
            debug!("training mode off; response not codified");
            return Ok(());
        }

        let inner = Arc::clone(self);
        self.ctx.executor.run_task(async move {
            if let Err(err) = inner.validate(&msg).await {
                // A shape violation fails this unit of work, visibly, without
                // tearing the host down.
                inner.ctx.publish(
                    Topic::ProgressUpdated,
                    serde_json::to_value(ProgressUpdatedMsg {
                        progress_type: "prompt".to_string(),
                        id: msg.prompt_id.clone(),
                        target_id: Some(msg.prompt_id.clone()),
                        percent_complete: 0.0,
                        tracking_id: msg.tracking_id.clone(),
                        failed_message: Some(err.to_string()),
                    })?,
                );
                return Err(err);
            }
            Ok(())
        });
        Ok(())
    }

    async fn validate(&self, msg: &MainPromptCompleteMsg) -> Result<()> {
        let response = &msg.response;

        // The sources the answer claimed to be grounded on.
        let engrams = self
            .engram_repository
            .load_batch_retrieve_result(&response.retrieve_result)
            .await?;
        self.metrics.add(ENGRAMS_FETCHED, engrams.len() as u64);

        let mut meta_ids: Vec<String> = Vec::new();
        for engram in &engrams {
            if let Some(meta_id) = engram.meta_ids.first() {
                if !meta_ids.contains(meta_id) {
                    meta_ids.push(meta_id.clone());
                }
            }
        }
        let metas = self.meta_repository.load_batch(&meta_ids).await?;

        let request = LlmRequest::new(
            "validate",
            prompts::render_validate(response, &engrams, &metas),
        );
        let validate_response = self
            .validate_llm
            .instance
            .submit(&request, &self.validate_llm.args)
            .await?;

        let mut toml_data: toml::Table = strip_code_fences(&validate_response.text)
            .parse()
            .map_err(|err| {
                EngramError::Validation(format!("validate response is not valid TOML: {err}"))
            })?;

        // The model judged nothing worth keeping; that is a quiet outcome,
        // not an error.
        if toml_data.contains_key("not_memorable") {
            info!("response judged not memorable");
            self.metrics.increment(NOT_MEMORABLE);
            return Ok(());
        }

        ObservationRepository::validate_toml_dict(&toml_data)?;
        ObservationRepository::normalize_toml_dict(&mut toml_data, response);

        let observation =
            ObservationRepository::load_toml_dict(&toml_data, Some(msg.prompt_id.clone()))?
                .merge_scored(ACCURACY_CONSTANT, RELEVANCY_CONSTANT);
        self.metrics.increment(RESPONSES_VALIDATED);

        self.ctx.publish(
            Topic::ObservationCreated,
            serde_json::to_value(NodeCreatedMsg {
                id: observation.id.clone(),
                parent_id: Some(msg.prompt_id.clone()),
                tracking_id: Some(msg.tracking_id.clone()),
                doc_id: None,
            })?,
        );
        self.ctx.publish(
            Topic::EngramsCreated,
            serde_json::to_value(EngramsCreatedMsg {
                parent_id: observation.id.clone(),
                engram_id_array: observation
                    .engram_list
                    .iter()
                    .map(|e| e.id.clone())
                    .collect(),
                count: observation.engram_list.len(),
            })?,
        );
        self.ctx.publish(
            Topic::ObservationComplete,
            serde_json::to_value(ObservationCompleteMsg {
                observation,
                tracking_id: msg.tracking_id.clone(),
                repo_id: None,
            })?,
        );
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
