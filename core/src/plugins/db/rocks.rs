// Persistent document store (RocksDB)
use std::path::Path;

use async_trait::async_trait;
use rocksdb::{Options, DB};
use serde_json::Value;
use tracing::info;

use crate::plugin::recording::PLUGIN_PATHS_ENV;
use crate::plugin::traits::{Db, PluginArgs, Table};
use crate::{EngramError, Result};

/// RocksDB-backed document store. Keys are `{table}/{id}`, values are the
/// JSON documents as written.
pub struct RocksDb {
    db: DB,
}

impl RocksDb {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db =
            DB::open(&opts, path).map_err(|err| EngramError::Backend(err.to_string()))?;

        info!("rocksdb document store initialized");
        Ok(Self { db })
    }

    /// Open under `$LOCAL_STORAGE_ROOT_PATH` or, failing that, the plugin
    /// data root.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var("LOCAL_STORAGE_ROOT_PATH")
            .or_else(|_| std::env::var(PLUGIN_PATHS_ENV))
            .map_err(|_| {
                EngramError::Config(format!(
                    "set LOCAL_STORAGE_ROOT_PATH or {PLUGIN_PATHS_ENV} to use the rocks backend"
                ))
            })?;
        Self::new(Path::new(&root).join("documents"))
    }

    fn key(table: Table, id: &str) -> String {
        format!("{}/{id}", table.as_str())
    }
}

#[async_trait]
impl Db for RocksDb {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|err| EngramError::Backend(err.to_string()))
    }

    async fn fetch(
        &self,
        table: Table,
        ids: &[String],
        args: Option<&PluginArgs>,
    ) -> Result<Vec<Value>> {
        // Most-recent-N fetches scan the table prefix; history tables stay
        // small enough that this beats maintaining a second index.
        if ids.is_empty() {
            if let Some(limit) = args
                .and_then(|a| a.get("history_limit"))
                .and_then(|v| v.as_u64())
            {
                let prefix = format!("{}/", table.as_str());
                let mut docs: Vec<Value> = Vec::new();
                for item in self.db.prefix_iterator(prefix.as_bytes()) {
                    let (key, value) =
                        item.map_err(|err| EngramError::Backend(err.to_string()))?;
                    if !key.starts_with(prefix.as_bytes()) {
                        break;
                    }
                    docs.push(serde_json::from_slice(&value)?);
                }
                docs.sort_by_key(|doc| {
                    std::cmp::Reverse(doc.get("response_time").and_then(|v| v.as_i64()).unwrap_or(0))
                });
                docs.truncate(limit as usize);
                return Ok(docs);
            }
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        for id in ids {
            match self.db.get(Self::key(table, id)) {
                Ok(Some(bytes)) => docs.push(serde_json::from_slice(&bytes)?),
                Ok(None) => {}
                Err(err) => return Err(EngramError::Backend(err.to_string())),
            }
        }
        Ok(docs)
    }

    async fn insert_documents(&self, table: Table, docs: Vec<Value>) -> Result<()> {
        let mut batch = rocksdb::WriteBatch::default();
        for doc in docs {
            let id = doc
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    EngramError::Validation("document is missing an 'id' field".to_string())
                })?;
            batch.put(Self::key(table, id), serde_json::to_vec(&doc)?);
        }
        self.db
            .write(batch)
            .map_err(|err| EngramError::Backend(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_documents_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = RocksDb::new(dir.path()).unwrap();

        db.insert_documents(Table::Engram, vec![json!({ "id": "e1", "content": "x" })])
            .await
            .unwrap();

        let docs = db
            .fetch(Table::Engram, &["e1".to_string()], None)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["content"], "x");
    }
}
