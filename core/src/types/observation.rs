use serde::{Deserialize, Serialize};

use crate::types::engram::Engram;
use crate::types::meta::Meta;

/// One complete act of perception: a document scan or a validated answer,
/// carrying the meta and the engrams it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,

    /// The document or prompt this observation descends from.
    #[serde(default)]
    pub parent_id: Option<String>,

    pub meta: Meta,

    pub engram_list: Vec<Engram>,

    /// Unix seconds.
    pub created_at: i64,
}

impl Observation {
    pub fn new(parent_id: Option<String>, meta: Meta, engram_list: Vec<Engram>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id,
            meta,
            engram_list,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Keep only engrams scoring above both gates and fold their sources up
    /// into the meta. Survivors are derived memories: they no longer count as
    /// native source text.
    pub fn merge_scored(mut self, accuracy_gate: u8, relevancy_gate: u8) -> Self {
        self.engram_list.retain(|engram| {
            engram.accuracy.unwrap_or(0) > accuracy_gate
                && engram.relevancy.unwrap_or(0) > relevancy_gate
        });

        let mut source_ids: Vec<String> = Vec::new();
        let mut locations: Vec<String> = Vec::new();
        for engram in &mut self.engram_list {
            engram.is_native_source = false;
            for source_id in &engram.source_ids {
                if !source_ids.contains(source_id) {
                    source_ids.push(source_id.clone());
                }
            }
            for location in &engram.locations {
                if !locations.contains(location) {
                    locations.push(location.clone());
                }
            }
        }

        self.meta.source_ids = source_ids;
        self.meta.locations = locations;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::engram::Index;
    use crate::types::meta::MetaType;

    fn scored_engram(accuracy: u8, relevancy: u8, source: &str) -> Engram {
        let mut engram = Engram::new(
            vec![format!("llm://{source}")],
            vec![source.to_string()],
            "fact",
            false,
        );
        engram.accuracy = Some(accuracy);
        engram.relevancy = Some(relevancy);
        engram
    }

    #[test]
    fn merge_drops_low_scores_and_unions_sources() {
        let meta = Meta::new(MetaType::Prompt, Index::new("summary"));
        let observation = Observation::new(
            None,
            meta,
            vec![
                scored_engram(4, 4, "alpha"),
                scored_engram(2, 1, "beta"),
                scored_engram(4, 4, "gamma"),
            ],
        );

        let merged = observation.merge_scored(3, 3);
        assert_eq!(merged.engram_list.len(), 2);
        assert!(merged.engram_list.iter().all(|e| !e.is_native_source));
        assert_eq!(merged.meta.source_ids, vec!["alpha", "gamma"]);
    }
}
