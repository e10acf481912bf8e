// Engramic Core Library
// Retrieval-augmented memory engine runtime

pub mod codify;
pub mod consolidate;
pub mod event;
pub mod executor;
pub mod host;
pub mod messages;
pub mod metrics;
pub mod plugin;
pub mod plugins;
pub mod progress;
pub mod repo;
pub mod repository;
pub mod response;
pub mod retrieve;
pub mod sense;
pub mod service;
pub mod storage;
pub mod stream;
pub mod telemetry;
pub mod types;

// Export core types
pub use event::{BusStats, MessageBus, MessageService, Topic};
pub use executor::{Executor, GatherResults, TaskHandle};
pub use host::Host;
pub use plugin::manager::PluginManager;
pub use service::{Service, ServiceContext};
pub use stream::{NullSink, StreamPacket, StreamSink};
pub use types::{
    ConversationDirection, Engram, FileNode, Index, Meta, Observation, Prompt, PromptAnalysis,
    Response, RetrieveResult,
};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngramError {
    #[error("config error: {0}")]
    Config(String),

    #[error("plugin load error: {0}")]
    PluginLoad(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngramError>;
