//! Core data model: the entities that flow through the memory pipeline.

pub mod document;
pub mod engram;
pub mod meta;
pub mod observation;
pub mod process;
pub mod prompt;
pub mod response;
pub mod retrieve;

pub use document::{FileNode, NodeType, RootDirectory};
pub use engram::{index_node_id, Engram, Index};
pub use meta::{Meta, MetaType};
pub use observation::Observation;
pub use process::{Process, ProcessStatus};
pub use prompt::{Prompt, NULL_REPO};
pub use response::Response;
pub use retrieve::{ConversationDirection, PromptAnalysis, RetrieveResult};
