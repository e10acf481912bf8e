//! Typed payloads for the bus topics.
//!
//! Handlers deserialize into these instead of poking at raw maps; a
//! malformed payload surfaces as a contained handler error instead of a
//! silent mis-read. The `tracking_id` rides in the payload so nested work
//! stays correlated with the user action that spawned it.

use serde::{Deserialize, Serialize};

use crate::metrics::MetricPacket;
use crate::types::{Engram, Index, Meta, Observation, Prompt, PromptAnalysis, Response, RetrieveResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveCompleteMsg {
    pub ask_id: String,
    pub prompt: Prompt,
    pub analysis: PromptAnalysis,
    pub retrieve_result: RetrieveResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainPromptCompleteMsg {
    pub response: Response,
    pub prompt_id: String,
    pub training_mode: bool,
    pub tracking_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationCompleteMsg {
    pub observation: Observation,
    pub tracking_id: String,
    #[serde(default)]
    pub repo_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCompleteMsg {
    pub meta: Meta,
    pub tracking_id: String,
    #[serde(default)]
    pub repo_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngramCompleteMsg {
    pub engram: Engram,
    pub tracking_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCompleteMsg {
    pub engram_id: String,
    pub index: Vec<Index>,
    pub index_id_array: Vec<String>,
    pub tracking_id: String,
    #[serde(default)]
    pub repo_id: Option<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    /// "native" or "derived"; becomes the vector type filter.
    pub engram_type: String,
}

/// Creation announcements consumed by the progress tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCreatedMsg {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    /// For lessons: the document the lesson teaches.
    #[serde(default)]
    pub doc_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngramsCreatedMsg {
    pub parent_id: String,
    pub engram_id_array: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicesMsg {
    pub parent_id: String,
    pub index_id_array: Vec<String>,
    pub tracking_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdatedMsg {
    pub progress_type: String,
    pub id: String,
    #[serde(default)]
    pub target_id: Option<String>,
    pub percent_complete: f32,
    pub tracking_id: String,
    #[serde(default)]
    pub failed_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertedMsg {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitIdsMsg {
    pub submit_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMsg {
    pub id: String,
    pub name: String,
    pub timestamp: i64,
    pub metrics: MetricPacket,
}
