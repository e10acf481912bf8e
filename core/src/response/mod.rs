//! Response pipeline: engrams plus history in, a streamed grounded answer
//! out.

mod prompts;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::event::Topic;
use crate::messages::{MainPromptCompleteMsg, RetrieveCompleteMsg, StatusMsg};
use crate::metrics::MetricsTracker;
use crate::plugin::traits::{Llm, LlmRequest, Plugin};
use crate::repository::{EngramRepository, HistoryRepository};
use crate::service::{Service, ServiceContext};
use crate::stream::{NullSink, StreamSink};
use crate::types::Response;
use crate::{EngramError, Result};

const NAME: &str = "response-service";

const RETRIEVALS_RECEIVED: &str = "retrievals_received";
const MAIN_PROMPTS_COMPLETED: &str = "main_prompts_completed";

pub struct ResponseService {
    sink: Arc<dyn StreamSink>,
    inner: Option<Arc<ResponseInner>>,
}

impl Default for ResponseService {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseService {
    pub fn new() -> Self {
        Self {
            sink: Arc::new(NullSink),
            inner: None,
        }
    }

    /// Attach the streaming surface packets should be relayed to.
    pub fn with_sink(sink: Arc<dyn StreamSink>) -> Self {
        Self { sink, inner: None }
    }
}

struct ResponseInner {
    id: String,
    ctx: Arc<ServiceContext>,
    main_llm: Plugin<dyn Llm>,
    engram_repository: Arc<EngramRepository>,
    history_repository: Arc<HistoryRepository>,
    sink: Arc<dyn StreamSink>,
    metrics: MetricsTracker,
}

const HISTORY_LIMIT: usize = 3;

impl Service for ResponseService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let plugins = &ctx.plugins;
        let db = plugins.get_db("document")?;

        self.inner = Some(Arc::new(ResponseInner {
            id: uuid::Uuid::new_v4().to_string(),
            ctx: Arc::clone(ctx),
            main_llm: plugins.get_llm("response_main")?,
            engram_repository: Arc::new(EngramRepository::new(db.clone())),
            history_repository: Arc::new(HistoryRepository::new(db)),
            sink: Arc::clone(&self.sink),
            metrics: MetricsTracker::new(),
        }));
        Ok(())
    }

    fn start(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let inner = self
            .inner
            .clone()
            .ok_or_else(|| EngramError::Invariant("response service not initialized".to_string()))?;

        {
            let inner = Arc::clone(&inner);
            ctx.bus.subscribe(Topic::RetrieveComplete, NAME, move |payload| {
                inner.on_retrieve_complete(payload)
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

impl ResponseInner {
    fn on_retrieve_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: RetrieveCompleteMsg = serde_json::from_value(payload)?;
        self.metrics.increment(RETRIEVALS_RECEIVED);

        let inner = Arc::clone(self);
        self.ctx
            .executor
            .run_task(async move { inner.main_prompt(msg).await });
        Ok(())
    }

    async fn main_prompt(&self, msg: RetrieveCompleteMsg) -> Result<()> {
        // Engram batch and short history load side by side.
        let (engrams, history) = tokio::join!(
            self.engram_repository
                .load_batch_retrieve_result(&msg.retrieve_result),
            self.history_repository.recent(HISTORY_LIMIT)
        );
        let engrams = engrams?;
        let history = history.unwrap_or_default();

        let main_prompt = prompts::render_main(
            &msg.prompt,
            &engrams,
            &history,
            &msg.retrieve_result.conversation_direction,
            &msg.analysis,
        );

        #[cfg(debug_assertions)]
        self.ctx.publish(
            Topic::DebugMainPromptInput,
            serde_json::json!({
                "ask_id": msg.ask_id,
                "main_prompt": &main_prompt,
            }),
        );

        let request = LlmRequest::new("main_prompt", main_prompt);
        let llm_response = self
            .main_llm
            .instance
            .submit_streaming(&request, &self.main_llm.args, Arc::clone(&self.sink))
            .await?;

        let model = self.main_llm.arg_str("model", "unknown");
        let response = Response::new(
            llm_response.text,
            msg.retrieve_result,
            msg.prompt.prompt_str.clone(),
            msg.analysis,
            llm_response.model.unwrap_or(model),
        );
        debug!("main prompt complete: {} chars", response.response.len());
        self.metrics.increment(MAIN_PROMPTS_COMPLETED);

        self.ctx.publish(
            Topic::MainPromptComplete,
            serde_json::to_value(MainPromptCompleteMsg {
                response,
                prompt_id: msg.prompt.prompt_id.clone(),
                training_mode: msg.prompt.training_mode,
                tracking_id: msg.prompt.tracking_id.clone(),
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
