// Message bus implementation
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::Result;

/// The closed set of topics services may publish or subscribe to.
///
/// Everything the engine says to itself goes through one of these; ad-hoc
/// string topics are not supported so a typo cannot silently create a dead
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    SubmitPrompt,
    RetrieveComplete,
    MainPromptComplete,
    ObservationComplete,
    EngramComplete,
    MetaComplete,
    IndexComplete,
    PromptCreated,
    DocumentCreated,
    ObservationCreated,
    EngramsCreated,
    IndicesCreated,
    IndicesInserted,
    DocumentInserted,
    LessonCreated,
    LessonCompleted,
    PromptInserted,
    RepoSubmitIds,
    RepoDirectoryScanned,
    RepoFileFound,
    RepoFileFolderTreeUpdated,
    SubmitDocument,
    ProgressUpdated,
    Status,
    Acknowledge,
    StartProfiler,
    EndProfiler,
    DebugMainPromptInput,
    ResponseSubmitResponse,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::SubmitPrompt => "submit_prompt",
            Topic::RetrieveComplete => "retrieve_complete",
            Topic::MainPromptComplete => "main_prompt_complete",
            Topic::ObservationComplete => "observation_complete",
            Topic::EngramComplete => "engram_complete",
            Topic::MetaComplete => "meta_complete",
            Topic::IndexComplete => "index_complete",
            Topic::PromptCreated => "prompt_created",
            Topic::DocumentCreated => "document_created",
            Topic::ObservationCreated => "observation_created",
            Topic::EngramsCreated => "engrams_created",
            Topic::IndicesCreated => "indices_created",
            Topic::IndicesInserted => "indices_inserted",
            Topic::DocumentInserted => "document_inserted",
            Topic::LessonCreated => "lesson_created",
            Topic::LessonCompleted => "lesson_completed",
            Topic::PromptInserted => "prompt_inserted",
            Topic::RepoSubmitIds => "repo_submit_ids",
            Topic::RepoDirectoryScanned => "repo_directory_scanned",
            Topic::RepoFileFound => "repo_file_found",
            Topic::RepoFileFolderTreeUpdated => "repo_file_folder_tree_updated",
            Topic::SubmitDocument => "submit_document",
            Topic::ProgressUpdated => "progress_updated",
            Topic::Status => "status",
            Topic::Acknowledge => "acknowledge",
            Topic::StartProfiler => "start_profiler",
            Topic::EndProfiler => "end_profiler",
            Topic::DebugMainPromptInput => "debug_main_prompt_input",
            Topic::ResponseSubmitResponse => "response_submit_response",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handler invoked on the bus worker. Must not suspend; long work gets
/// dispatched to the executor from inside the handler.
pub type Handler = Arc<dyn Fn(Value) -> Result<()> + Send + Sync>;

struct Subscription {
    subscriber: String,
    handler: Handler,
}

/// Per-topic bus statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub handler_errors: u64,
    pub active_subscriptions: usize,
}

struct QueuedEvent {
    topic: Topic,
    payload: Value,
}

/// In-process topic pub/sub with fan-out to every subscribed handler.
///
/// Delivery is asynchronous: `publish` enqueues and returns, and a single
/// worker task drains the queue in publication order. Running every handler
/// on that one worker gives subscribers a free ordering guarantee and lets
/// stateful consumers (the progress tracker) mutate without contention.
/// Handler failures are logged and contained; delivery is at-most-once.
pub struct MessageBus {
    subscriptions: DashMap<Topic, Vec<Subscription>>,
    stats: DashMap<Topic, BusStats>,
    tx: Mutex<Option<mpsc::UnboundedSender<QueuedEvent>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedEvent>>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            subscriptions: DashMap::new(),
            stats: DashMap::new(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Subscribe a handler to a topic. A topic may have any number of
    /// handlers; a handler that returns an error stays subscribed.
    pub fn subscribe<F>(&self, topic: Topic, subscriber: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Result<()> + Send + Sync + 'static,
    {
        let subscriber = subscriber.into();
        debug!("subscribing {} to {}", subscriber, topic);

        self.subscriptions
            .entry(topic)
            .or_default()
            .push(Subscription {
                subscriber,
                handler: Arc::new(handler),
            });

        self.stats.entry(topic).or_default().active_subscriptions += 1;
    }

    /// Enqueue an event for asynchronous delivery. Per publisher and topic,
    /// subscribers see events in publication order.
    pub fn publish(&self, topic: Topic, payload: Value) {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => {
                self.stats.entry(topic).or_default().total_published += 1;
                if tx.send(QueuedEvent { topic, payload }).is_err() {
                    warn!("bus worker is gone; dropping event for {}", topic);
                }
            }
            None => warn!("bus is shut down; dropping event for {}", topic),
        }
    }

    pub fn stats(&self, topic: Topic) -> Option<BusStats> {
        self.stats.get(&topic).map(|s| s.clone())
    }

    /// Take the delivery loop future. Normally driven by the bus service;
    /// a second call returns None.
    pub fn take_worker(self: &Arc<Self>) -> Option<impl std::future::Future<Output = ()>> {
        let mut rx = self
            .rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        let bus = Arc::clone(self);

        Some(async move {
            info!("message bus worker started");
            while let Some(event) = rx.recv().await {
                bus.deliver(event);
            }
            info!("message bus worker stopped");
        })
    }

    fn deliver(&self, event: QueuedEvent) {
        // Snapshot the handler list so a handler that publishes (or a
        // subscriber registering mid-delivery) never contends with the
        // subscription table.
        let handlers: Vec<(String, Handler)> = match self.subscriptions.get(&event.topic) {
            Some(subs) => subs
                .iter()
                .map(|sub| (sub.subscriber.clone(), Arc::clone(&sub.handler)))
                .collect(),
            None => {
                debug!("no subscriptions for topic {}", event.topic);
                return;
            }
        };

        let mut delivered = 0u64;
        let mut failed = 0u64;
        for (subscriber, handler) in handlers {
            match handler(event.payload.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    failed += 1;
                    error!("handler {} failed on {}: {}", subscriber, event.topic, err);
                }
            }
        }

        let mut stats = self.stats.entry(event.topic).or_default();
        stats.total_delivered += delivered;
        stats.handler_errors += failed;
    }

    /// Stop accepting new events. The worker drains what is already queued,
    /// delivers it, and then exits.
    pub fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

pub const BUS_SERVICE_NAME: &str = "message-service";

/// The bus as a service. Owning the delivery loop here rather than in the
/// host keeps the transport swappable for a socket-backed bus without
/// touching any subscriber.
#[derive(Default)]
pub struct MessageService;

impl MessageService {
    pub fn new() -> Self {
        Self
    }
}

impl crate::service::Service for MessageService {
    fn name(&self) -> &'static str {
        BUS_SERVICE_NAME
    }

    fn init_async(&mut self, ctx: &Arc<crate::service::ServiceContext>) -> Result<()> {
        if let Some(worker) = ctx.bus.take_worker() {
            ctx.executor.run_background(async move {
                worker.await;
                Ok(())
            });
        }
        Ok(())
    }

    fn start(&mut self, _ctx: &Arc<crate::service::ServiceContext>) -> Result<()> {
        Ok(())
    }
}
