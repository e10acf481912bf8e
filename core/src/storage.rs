//! Storage service: persists completed entities as they are announced.
//!
//! Subscribes to the four completion topics and writes each entity to its
//! repository table off the bus worker. No reads happen here.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::event::Topic;
use crate::messages::{
    EngramCompleteMsg, MainPromptCompleteMsg, MetaCompleteMsg, ObservationCompleteMsg, StatusMsg,
};
use crate::metrics::MetricsTracker;
use crate::repository::{
    EngramRepository, HistoryRepository, MetaRepository, ObservationRepository,
};
use crate::service::{Service, ServiceContext};
use crate::{EngramError, Result};

const NAME: &str = "storage-service";

const OBSERVATIONS_SAVED: &str = "observations_saved";
const ENGRAMS_SAVED: &str = "engrams_saved";
const METAS_SAVED: &str = "metas_saved";
const HISTORY_SAVED: &str = "history_saved";

pub struct StorageService {
    inner: Option<Arc<StorageInner>>,
}

impl Default for StorageService {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageService {
    pub fn new() -> Self {
        Self { inner: None }
    }
}

struct StorageInner {
    id: String,
    ctx: Arc<ServiceContext>,
    observation_repository: Arc<ObservationRepository>,
    engram_repository: Arc<EngramRepository>,
    meta_repository: Arc<MetaRepository>,
    history_repository: Arc<HistoryRepository>,
    metrics: MetricsTracker,
}

impl Service for StorageService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let db = ctx.plugins.get_db("document")?;

        self.inner = Some(Arc::new(StorageInner {
            id: uuid::Uuid::new_v4().to_string(),
            ctx: Arc::clone(ctx),
            observation_repository: Arc::new(ObservationRepository::new(db.clone())),
            engram_repository: Arc::new(EngramRepository::new(db.clone())),
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
            .ok_or_else(|| EngramError::Invariant("storage service not initialized".to_string()))?;

        {
            let inner = Arc::clone(&inner);
            ctx.bus
                .subscribe(Topic::ObservationComplete, NAME, move |payload| {
                    inner.on_observation_complete(payload)
                });
        }
        {
            let inner = Arc::clone(&inner);
            ctx.bus
                .subscribe(Topic::EngramComplete, NAME, move |payload| {
                    inner.on_engram_complete(payload)
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

impl StorageInner {
    fn on_observation_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: ObservationCompleteMsg = serde_json::from_value(payload)?;
        let inner = Arc::clone(self);
        self.ctx.executor.run_task(async move {
            inner.observation_repository.save(&msg.observation).await?;
            inner.metrics.increment(OBSERVATIONS_SAVED);
            debug!("observation {} saved", msg.observation.id);
            Ok(())
        });
        Ok(())
    }

    fn on_engram_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: EngramCompleteMsg = serde_json::from_value(payload)?;
        let inner = Arc::clone(self);
        self.ctx.executor.run_task(async move {
            inner.engram_repository.save(&msg.engram).await?;
            inner.metrics.increment(ENGRAMS_SAVED);
            debug!("engram {} saved", msg.engram.id);
            Ok(())
        });
        Ok(())
    }

    fn on_meta_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: MetaCompleteMsg = serde_json::from_value(payload)?;
        let inner = Arc::clone(self);
        self.ctx.executor.run_task(async move {
            inner.meta_repository.save(&msg.meta).await?;
            inner.metrics.increment(METAS_SAVED);
            debug!("meta {} saved", msg.meta.id);
            Ok(())
        });
        Ok(())
    }

    fn on_prompt_complete(self: &Arc<Self>, payload: Value) -> Result<()> {
        let msg: MainPromptCompleteMsg = serde_json::from_value(payload)?;
        let inner = Arc::clone(self);
        self.ctx.executor.run_task(async move {
            inner.history_repository.save(&msg.response).await?;
            inner.metrics.increment(HISTORY_SAVED);
            debug!("history row {} saved", msg.response.id);
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
