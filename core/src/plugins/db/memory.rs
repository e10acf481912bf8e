use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::plugin::traits::{Db, PluginArgs, Table};
use crate::{EngramError, Result};

/// In-memory document store. Tables keep insertion order so history-style
/// "most recent N" fetches work without a query language.
pub struct MemoryDb {
    tables: DashMap<Table, Vec<(String, Value)>>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    pub fn len(&self, table: Table) -> usize {
        self.tables.get(&table).map_or(0, |t| t.len())
    }

    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }

    pub(crate) fn insert_all(&self, table: Table, docs: Vec<Value>) -> Result<()> {
        let mut rows = self.tables.entry(table).or_default();
        for doc in docs {
            let id = doc_id(&doc)?;
            match rows.iter_mut().find(|(existing, _)| *existing == id) {
                Some((_, slot)) => *slot = doc,
                None => rows.push((id, doc)),
            }
        }
        debug!("{} now holds {} documents", table.as_str(), rows.len());
        Ok(())
    }
}

fn doc_id(doc: &Value) -> Result<String> {
    doc.get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| EngramError::Validation("document is missing an 'id' field".to_string()))
}

#[async_trait]
impl Db for MemoryDb {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch(
        &self,
        table: Table,
        ids: &[String],
        args: Option<&PluginArgs>,
    ) -> Result<Vec<Value>> {
        let Some(rows) = self.tables.get(&table) else {
            return Ok(Vec::new());
        };

        // Backend-specific override: no ids plus a history_limit means
        // "the most recent N", newest first.
        if ids.is_empty() {
            if let Some(limit) = args
                .and_then(|a| a.get("history_limit"))
                .and_then(|v| v.as_u64())
            {
                return Ok(rows
                    .iter()
                    .rev()
                    .take(limit as usize)
                    .map(|(_, doc)| doc.clone())
                    .collect());
            }
            return Ok(Vec::new());
        }

        Ok(rows
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn insert_documents(&self, table: Table, docs: Vec<Value>) -> Result<()> {
        self.insert_all(table, docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_then_fetch_round_trips() {
        let db = MemoryDb::new();
        db.insert_documents(Table::Engram, vec![json!({ "id": "e1", "content": "x" })])
            .await
            .unwrap();

        let docs = db
            .fetch(Table::Engram, &["e1".to_string()], None)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], "e1");
    }

    #[tokio::test]
    async fn reinsert_replaces_in_place() {
        let db = MemoryDb::new();
        db.insert_documents(Table::Document, vec![json!({ "id": "d1", "v": 1 })])
            .await
            .unwrap();
        db.insert_documents(Table::Document, vec![json!({ "id": "d1", "v": 2 })])
            .await
            .unwrap();

        assert_eq!(db.len(Table::Document), 1);
        let docs = db
            .fetch(Table::Document, &["d1".to_string()], None)
            .await
            .unwrap();
        assert_eq!(docs[0]["v"], 2);
    }

    #[tokio::test]
    async fn history_limit_returns_newest_first() {
        let db = MemoryDb::new();
        for i in 0..5 {
            db.insert_documents(Table::History, vec![json!({ "id": format!("h{i}"), "n": i })])
                .await
                .unwrap();
        }

        let mut args = PluginArgs::new();
        args.insert("history_limit".to_string(), 2.into());
        let docs = db.fetch(Table::History, &[], Some(&args)).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["id"], "h4");
        assert_eq!(docs[1]["id"], "h3");
    }

    #[tokio::test]
    async fn missing_id_is_rejected() {
        let db = MemoryDb::new();
        let err = db
            .insert_documents(Table::Engram, vec![json!({ "content": "no id" })])
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }
}
