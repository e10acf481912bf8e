use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::plugin::traits::{Db, Plugin, Table};
use crate::types::Meta;
use crate::Result;

pub struct MetaRepository {
    db: Plugin<dyn Db>,
    cache: Mutex<LruCache<String, Meta>>,
}

impl MetaRepository {
    pub fn new(db: Plugin<dyn Db>) -> Self {
        Self {
            db,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(super::CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    pub async fn save(&self, meta: &Meta) -> Result<()> {
        let doc = serde_json::to_value(meta)?;
        self.db
            .instance
            .insert_documents(Table::Meta, vec![doc])
            .await
    }

    pub async fn load(&self, id: &str) -> Result<Option<Meta>> {
        Ok(self.load_batch(&[id.to_string()]).await?.into_iter().next())
    }

    pub async fn load_batch(&self, ids: &[String]) -> Result<Vec<Meta>> {
        let mut found: Vec<Meta> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for id in ids {
                if missing.contains(id) || found.iter().any(|m| &m.id == id) {
                    continue;
                }
                match cache.get(id) {
                    Some(meta) => found.push(meta.clone()),
                    None => missing.push(id.clone()),
                }
            }
        }

        if missing.is_empty() {
            return Ok(found);
        }

        let docs = self.db.instance.fetch(Table::Meta, &missing, None).await?;
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        for doc in docs {
            let meta: Meta = serde_json::from_value(doc)?;
            cache.put(meta.id.clone(), meta.clone());
            found.push(meta);
        }
        Ok(found)
    }
}
