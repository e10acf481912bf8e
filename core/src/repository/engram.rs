use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::plugin::traits::{Db, Plugin, Table};
use crate::types::{Engram, RetrieveResult};
use crate::Result;

pub struct EngramRepository {
    db: Plugin<dyn Db>,
    cache: Mutex<LruCache<String, Engram>>,
}

impl EngramRepository {
    pub fn new(db: Plugin<dyn Db>) -> Self {
        Self {
            db,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(super::CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    pub async fn save(&self, engram: &Engram) -> Result<()> {
        let doc = serde_json::to_value(engram)?;
        self.db
            .instance
            .insert_documents(Table::Engram, vec![doc])
            .await
    }

    pub async fn load(&self, id: &str) -> Result<Option<Engram>> {
        Ok(self.load_batch(&[id.to_string()]).await?.into_iter().next())
    }

    /// Cached union load: hits come from the cache, misses from the backend,
    /// and the result keeps set semantics over the requested ids.
    pub async fn load_batch(&self, ids: &[String]) -> Result<Vec<Engram>> {
        let mut found: Vec<Engram> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for id in ids {
                if missing.contains(id) || found.iter().any(|e| &e.id == id) {
                    continue;
                }
                match cache.get(id) {
                    Some(engram) => found.push(engram.clone()),
                    None => missing.push(id.clone()),
                }
            }
        }

        if missing.is_empty() {
            return Ok(found);
        }

        let docs = self.db.instance.fetch(Table::Engram, &missing, None).await?;
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        for doc in docs {
            let engram: Engram = serde_json::from_value(doc)?;
            cache.put(engram.id.clone(), engram.clone());
            found.push(engram);
        }
        Ok(found)
    }

    pub async fn load_batch_retrieve_result(
        &self,
        retrieve_result: &RetrieveResult,
    ) -> Result<Vec<Engram>> {
        self.load_batch(&retrieve_result.engram_id_array).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manager::PluginManager;

    fn repository() -> EngramRepository {
        let manager = PluginManager::new("mock").unwrap();
        EngramRepository::new(manager.get_db("document").unwrap())
    }

    #[tokio::test]
    async fn save_then_load_round_trips_the_id() {
        let repository = repository();
        let engram = Engram::new(
            vec!["file:///doc".to_string()],
            vec!["src-1".to_string()],
            "a remembered fact",
            true,
        );

        repository.save(&engram).await.unwrap();
        let loaded = repository.load(&engram.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, engram.id);
        assert_eq!(loaded.content, engram.content);
    }

    #[tokio::test]
    async fn batch_load_deduplicates_requested_ids() {
        let repository = repository();
        let engram = Engram::new(vec![], vec![], "once", true);
        repository.save(&engram).await.unwrap();

        let loaded = repository
            .load_batch(&[engram.id.clone(), engram.id.clone()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn second_load_is_served_from_the_cache() {
        let repository = repository();
        let engram = Engram::new(vec![], vec![], "cached", true);
        repository.save(&engram).await.unwrap();

        repository.load(&engram.id).await.unwrap().unwrap();
        {
            let cache = repository.cache.lock().unwrap();
            assert!(cache.contains(&engram.id));
        }
        repository.load(&engram.id).await.unwrap().unwrap();
    }
}
