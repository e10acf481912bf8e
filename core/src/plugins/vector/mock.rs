use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::plugin::traits::{Collection, PluginArgs, VectorDb, VectorFilters};
use crate::plugins::fixtures;
use crate::types::Index;
use crate::Result;

/// Deterministic vector store: queries answer with the fixture id sets and
/// inserts are counted so tests can observe them.
pub struct MockVectorDb {
    inserted: DashMap<Collection, usize>,
}

impl Default for MockVectorDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVectorDb {
    pub fn new() -> Self {
        Self {
            inserted: DashMap::new(),
        }
    }

    pub fn inserted(&self, collection: Collection) -> usize {
        self.inserted.get(&collection).map_or(0, |v| *v)
    }
}

#[async_trait]
impl VectorDb for MockVectorDb {
    async fn insert(
        &self,
        collection: Collection,
        indices: &[Index],
        obj_id: &str,
        _filters: &VectorFilters,
    ) -> Result<()> {
        debug!(
            "mock vector insert: {} indices for {} into {}",
            indices.len(),
            obj_id,
            collection.as_str()
        );
        *self.inserted.entry(collection).or_insert(0) += indices.len();
        Ok(())
    }

    async fn query(
        &self,
        collection: Collection,
        _embedding: &[f32],
        _filters: &VectorFilters,
        _args: &PluginArgs,
    ) -> Result<Vec<String>> {
        let ids = match collection {
            Collection::Main => fixtures::ENGRAM_IDS,
            Collection::Meta => fixtures::META_IDS,
        };
        Ok(ids.iter().map(|id| id.to_string()).collect())
    }
}
