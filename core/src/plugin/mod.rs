//! Plugin loading and profile resolution.
//!
//! A profile names one concrete backend per (category, usage) slot; the
//! manager resolves the profile, instantiates backends from a registry of
//! factories, and hands services a uniform invocation handle.

pub mod manager;
pub mod profiles;
pub mod recording;
pub mod traits;

pub use manager::PluginManager;
pub use profiles::Profiles;
pub use recording::{RecordMode, Recorder};
pub use traits::{
    Collection, Db, EmbedRequest, Embedding, Llm, LlmRequest, LlmResponse, Plugin, PluginArgs,
    Table, VectorDb, VectorFilters,
};
