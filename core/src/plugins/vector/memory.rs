use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::plugin::traits::{Collection, PluginArgs, VectorDb, VectorFilters};
use crate::types::Index;
use crate::{EngramError, Result};

const DEFAULT_THRESHOLD: f32 = 0.5;
const DEFAULT_N_RESULTS: usize = 10;

#[derive(Debug, Clone)]
struct Entry {
    obj_id: String,
    embedding: Vec<f32>,
    repo_ids: Vec<String>,
    types: Vec<String>,
    locations: Vec<String>,
}

/// In-process cosine vector store.
///
/// Good enough for single-process operation and tests; a server-backed
/// store slots in behind the same trait.
pub struct MemoryVectorDb {
    collections: DashMap<Collection, Vec<Entry>>,
}

impl Default for MemoryVectorDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVectorDb {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections.get(&collection).map_or(0, |c| c.len())
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }
}

/// Cosine distance: 0 for identical direction, 2 for opposite.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

fn filter_matches(entry_values: &[String], wanted: &[String]) -> bool {
    wanted.is_empty() || wanted.iter().any(|w| entry_values.contains(w))
}

#[async_trait]
impl VectorDb for MemoryVectorDb {
    async fn insert(
        &self,
        collection: Collection,
        indices: &[Index],
        obj_id: &str,
        filters: &VectorFilters,
    ) -> Result<()> {
        let mut entries = self.collections.entry(collection).or_default();
        for index in indices {
            let Some(embedding) = &index.embedding else {
                return Err(EngramError::Validation(format!(
                    "index '{}' has no embedding to insert",
                    index.text
                )));
            };
            entries.push(Entry {
                obj_id: obj_id.to_string(),
                embedding: embedding.clone(),
                repo_ids: filters.repo_ids.clone(),
                types: filters.types.clone(),
                locations: filters.locations.clone(),
            });
        }
        debug!(
            "inserted {} vectors for {} into {}",
            indices.len(),
            obj_id,
            collection.as_str()
        );
        Ok(())
    }

    async fn query(
        &self,
        collection: Collection,
        embedding: &[f32],
        filters: &VectorFilters,
        args: &PluginArgs,
    ) -> Result<Vec<String>> {
        let threshold = args
            .get("threshold")
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
            .unwrap_or(DEFAULT_THRESHOLD);
        let n_results = args
            .get("n_results")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_N_RESULTS);

        let Some(entries) = self.collections.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .filter(|entry| filter_matches(&entry.repo_ids, &filters.repo_ids))
            .filter(|entry| filter_matches(&entry.types, &filters.types))
            .filter(|entry| filter_matches(&entry.locations, &filters.locations))
            .map(|entry| (cosine_distance(embedding, &entry.embedding), entry))
            .filter(|(distance, _)| *distance < threshold)
            .collect();

        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut ids = Vec::new();
        for (_, entry) in scored {
            if !ids.contains(&entry.obj_id) {
                ids.push(entry.obj_id.clone());
            }
            if ids.len() >= n_results {
                break;
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(threshold: f64, n_results: u64) -> PluginArgs {
        let mut args = PluginArgs::new();
        args.insert("threshold".to_string(), threshold.into());
        args.insert("n_results".to_string(), n_results.into());
        args
    }

    fn filters(repo: &str) -> VectorFilters {
        VectorFilters {
            repo_ids: vec![repo.to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn query_returns_nearest_under_threshold() {
        let store = MemoryVectorDb::new();
        store
            .insert(
                Collection::Main,
                &[Index::with_embedding("close", vec![1.0, 0.0])],
                "near",
                &filters("null"),
            )
            .await
            .unwrap();
        store
            .insert(
                Collection::Main,
                &[Index::with_embedding("far", vec![0.0, 1.0])],
                "far",
                &filters("null"),
            )
            .await
            .unwrap();

        let ids = store
            .query(
                Collection::Main,
                &[1.0, 0.1],
                &filters("null"),
                &args(0.5, 10),
            )
            .await
            .unwrap();
        assert_eq!(ids, vec!["near".to_string()]);
    }

    #[tokio::test]
    async fn repo_filter_excludes_other_repos() {
        let store = MemoryVectorDb::new();
        store
            .insert(
                Collection::Main,
                &[Index::with_embedding("a", vec![1.0, 0.0])],
                "in-repo",
                &filters("repo-a"),
            )
            .await
            .unwrap();

        let hit = store
            .query(
                Collection::Main,
                &[1.0, 0.0],
                &filters("repo-a"),
                &args(0.5, 10),
            )
            .await
            .unwrap();
        let miss = store
            .query(
                Collection::Main,
                &[1.0, 0.0],
                &filters("repo-b"),
                &args(0.5, 10),
            )
            .await
            .unwrap();

        assert_eq!(hit.len(), 1);
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn insert_without_embedding_is_rejected() {
        let store = MemoryVectorDb::new();
        let err = store
            .insert(
                Collection::Main,
                &[Index::new("no vector")],
                "x",
                &VectorFilters::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }
}
