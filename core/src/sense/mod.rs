//! Sense pipeline: documents in, observations out.
//!
//! Documents are the only input modality for now. Rasterization is
//! delegated through the [`Rasterizer`] contract; everything after the page
//! images - structured scans, chunking, meta synthesis - happens here.

pub mod engram_file;
mod prompts;
mod scan;

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::event::Topic;
use crate::messages::{NodeCreatedMsg, ProgressUpdatedMsg, StatusMsg};
use crate::metrics::MetricsTracker;
use crate::plugin::traits::{Llm, Plugin};
use crate::service::{Service, ServiceContext};
use crate::types::FileNode;
use crate::{EngramError, Result};

pub use scan::{split_chunks, Scan, MAX_CHUNK_SIZE};

const NAME: &str = "sense-service";

const DOCUMENTS_SUBMITTED: &str = "documents_submitted";
const DOCUMENTS_FAILED: &str = "documents_failed";

/// Produces page images for a document. The PDF decoding itself lives
/// outside this crate.
pub trait Rasterizer: Send + Sync {
    /// One encoded PNG string per page, in page order.
    fn rasterize(&self, node: &FileNode) -> Result<Vec<String>>;
}

/// Deterministic stand-in: fixed page count, synthetic page payloads.
pub struct MockRasterizer {
    pages: usize,
}

impl MockRasterizer {
    pub fn new(pages: usize) -> Self {
        Self { pages }
    }
}

impl Rasterizer for MockRasterizer {
    fn rasterize(&self, node: &FileNode) -> Result<Vec<String>> {
        Ok((0..self.pages)
            .map(|page| format!("png:{}:{page}", node.file_name))
            .collect())
    }
}

pub struct SenseService {
    rasterizer: Arc<dyn Rasterizer>,
    inner: Option<Arc<SenseInner>>,
}

impl Default for SenseService {
    fn default() -> Self {
        Self::new()
    }
}

impl SenseService {
    pub fn new() -> Self {
        Self::with_rasterizer(Arc::new(MockRasterizer::new(3)))
    }

    pub fn with_rasterizer(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            rasterizer,
            inner: None,
        }
    }
}

pub(crate) struct SenseInner {
    pub(crate) id: String,
    pub(crate) ctx: Arc<ServiceContext>,
    pub(crate) initial_summary_llm: Plugin<dyn Llm>,
    pub(crate) scan_page_llm: Plugin<dyn Llm>,
    pub(crate) full_summary_llm: Plugin<dyn Llm>,
    pub(crate) rasterizer: Arc<dyn Rasterizer>,
    pub(crate) metrics: MetricsTracker,
}

impl Service for SenseService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let plugins = &ctx.plugins;

        self.inner = Some(Arc::new(SenseInner {
            id: uuid::Uuid::new_v4().to_string(),
            ctx: Arc::clone(ctx),
            initial_summary_llm: plugins.get_llm("sense_initial_summary")?,
            scan_page_llm: plugins.get_llm("sense_scan")?,
            full_summary_llm: plugins.get_llm("sense_full_summary")?,
            rasterizer: Arc::clone(&self.rasterizer),
            metrics: MetricsTracker::new(),
        }));
        Ok(())
    }

    fn start(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let inner = self
            .inner
            .clone()
            .ok_or_else(|| EngramError::Invariant("sense service not initialized".to_string()))?;

        {
            let inner = Arc::clone(&inner);
            ctx.bus.subscribe(Topic::SubmitDocument, NAME, move |payload| {
                inner.on_document_submit(payload)
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

impl SenseInner {
    fn on_document_submit(self: &Arc<Self>, payload: Value) -> Result<()> {
        let node: FileNode = serde_json::from_value(payload)?;
        self.metrics.increment(DOCUMENTS_SUBMITTED);

        self.ctx.publish(
            Topic::DocumentCreated,
            serde_json::to_value(NodeCreatedMsg {
                id: node.id.clone(),
                parent_id: None,
                tracking_id: Some(node.tracking_id.clone()),
                doc_id: None,
            })?,
        );

        let inner = Arc::clone(self);
        self.ctx.executor.run_task(async move {
            let document_id = node.id.clone();
            let tracking_id = node.tracking_id.clone();
            let scan = Scan::new(Arc::clone(&inner), node);

            if let Err(err) = scan.run().await {
                warn!("document {document_id} failed to scan: {err}");
                inner.metrics.increment(DOCUMENTS_FAILED);
                inner.ctx.publish(
                    Topic::ProgressUpdated,
                    serde_json::to_value(ProgressUpdatedMsg {
                        progress_type: "document".to_string(),
                        id: document_id.clone(),
                        target_id: Some(document_id),
                        percent_complete: 0.0,
                        tracking_id,
                        failed_message: Some(err.to_string()),
                    })?,
                );
                return Err(err);
            }
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
