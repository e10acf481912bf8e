use crate::plugin::traits::{Db, Plugin, PluginArgs, Table};
use crate::types::Response;
use crate::Result;

/// Exchange history: one row per completed response. Reads always ask for
/// "the most recent N", which the backend serves through its
/// `history_limit` override.
pub struct HistoryRepository {
    db: Plugin<dyn Db>,
}

impl HistoryRepository {
    pub fn new(db: Plugin<dyn Db>) -> Self {
        Self { db }
    }

    pub async fn save(&self, response: &Response) -> Result<()> {
        let doc = serde_json::to_value(response)?;
        self.db
            .instance
            .insert_documents(Table::History, vec![doc])
            .await
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Response>> {
        let mut args = PluginArgs::new();
        args.insert("history_limit".to_string(), (limit as u64).into());

        let docs = self
            .db
            .instance
            .fetch(Table::History, &[], Some(&args))
            .await?;

        let mut rows = Vec::with_capacity(docs.len());
        for doc in docs {
            rows.push(serde_json::from_value(doc)?);
        }
        Ok(rows)
    }
}
