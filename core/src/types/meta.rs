use serde::{Deserialize, Serialize};

use crate::types::engram::Index;

/// What kind of source a meta summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaType {
    Document,
    Prompt,
}

/// Summary record grouping the engrams that came out of a single source or
/// answer. The full summary is itself an index so the meta can be found by
/// coarse semantic search before any engram-level lookup happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub id: String,

    #[serde(rename = "type")]
    pub meta_type: MetaType,

    #[serde(default)]
    pub locations: Vec<String>,

    #[serde(default)]
    pub source_ids: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub summary_initial: String,

    pub summary_full: Index,

    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Meta {
    pub fn new(meta_type: MetaType, summary_full: Index) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            meta_type,
            locations: Vec::new(),
            source_ids: Vec::new(),
            keywords: Vec::new(),
            summary_initial: String::new(),
            summary_full,
            parent_id: None,
        }
    }
}
