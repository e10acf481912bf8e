use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::stream::StreamSink;
use crate::types::Index;
use crate::Result;

/// Per-usage configuration from the active profile, passed through to the
/// backend on every call.
pub type PluginArgs = Map<String, Value>;

/// The closed set of document-store tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Engram,
    Meta,
    Observation,
    History,
    Document,
    Process,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Engram => "engram",
            Table::Meta => "meta",
            Table::Observation => "observation",
            Table::History => "history",
            Table::Document => "document",
            Table::Process => "process",
        }
    }
}

/// Vector collections: `Main` holds engram indices, `Meta` holds the full
/// summaries of metas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Main,
    Meta,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Main => "main",
            Collection::Meta => "meta",
        }
    }
}

/// Filters attached to vector entries at insert time and matched at query
/// time. Empty filter lists at query time match everything.
#[derive(Debug, Clone, Default)]
pub struct VectorFilters {
    pub repo_ids: Vec<String>,
    pub types: Vec<String>,
    pub locations: Vec<String>,
}

/// One LLM call. `caller` and `index` key the recorded-data lookup so mock
/// runs replay deterministically, including parallel batches.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub structured_schema: Option<Value>,
    pub images: Vec<String>,
    pub caller: &'static str,
    pub index: usize,
}

impl LlmRequest {
    pub fn new(caller: &'static str, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            structured_schema: None,
            images: Vec::new(),
            caller,
            index: 0,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.structured_schema = Some(schema);
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
}

/// One embedding call; `caller`/`index` key recording like [`LlmRequest`].
#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub strings: Vec<String>,
    pub caller: &'static str,
    pub index: usize,
}

impl EmbedRequest {
    pub fn new(caller: &'static str, strings: Vec<String>) -> Self {
        Self {
            strings,
            caller,
            index: 0,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

/// Language model backend. Implementations strip code-fence wrappers from
/// structured (TOML/JSON) responses before returning them.
#[async_trait]
pub trait Llm: Send + Sync {
    async fn submit(&self, request: &LlmRequest, args: &PluginArgs) -> Result<LlmResponse>;

    async fn submit_streaming(
        &self,
        request: &LlmRequest,
        args: &PluginArgs,
        sink: Arc<dyn StreamSink>,
    ) -> Result<LlmResponse>;
}

/// Embedding backend: one vector per input string, order preserved.
#[async_trait]
pub trait Embedding: Send + Sync {
    async fn gen_embed(&self, request: &EmbedRequest, args: &PluginArgs) -> Result<Vec<Vec<f32>>>;
}

/// Vector store backend. Distance metric is cosine; a query returns ids of
/// entries whose distance falls below the configured threshold.
#[async_trait]
pub trait VectorDb: Send + Sync {
    async fn insert(
        &self,
        collection: Collection,
        indices: &[Index],
        obj_id: &str,
        filters: &VectorFilters,
    ) -> Result<()>;

    async fn query(
        &self,
        collection: Collection,
        embedding: &[f32],
        filters: &VectorFilters,
        args: &PluginArgs,
    ) -> Result<Vec<String>>;
}

/// Document store backend. Documents are free-form maps with a required
/// `id` field.
#[async_trait]
pub trait Db: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    async fn fetch(
        &self,
        table: Table,
        ids: &[String],
        args: Option<&PluginArgs>,
    ) -> Result<Vec<Value>>;

    async fn insert_documents(&self, table: Table, docs: Vec<Value>) -> Result<()>;
}

/// Uniform invocation handle: the backend instance plus the profile args
/// for the usage slot it was resolved under.
pub struct Plugin<T: ?Sized> {
    pub instance: Arc<T>,
    pub args: PluginArgs,
    pub usage: String,
}

impl<T: ?Sized> std::fmt::Debug for Plugin<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("args", &self.args)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Clone for Plugin<T> {
    fn clone(&self) -> Self {
        Self {
            instance: Arc::clone(&self.instance),
            args: self.args.clone(),
            usage: self.usage.clone(),
        }
    }
}

impl<T: ?Sized> Plugin<T> {
    pub fn arg_f32(&self, key: &str, default: f32) -> f32 {
        self.args
            .get(key)
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
            .unwrap_or(default)
    }

    pub fn arg_usize(&self, key: &str, default: usize) -> usize {
        self.args
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    pub fn arg_str(&self, key: &str, default: &str) -> String {
        self.args
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }
}
