use crate::plugin::traits::{Db, Plugin, PluginArgs, Table};
use crate::types::Process;
use crate::Result;

pub struct ProcessRepository {
    db: Plugin<dyn Db>,
}

impl ProcessRepository {
    pub fn new(db: Plugin<dyn Db>) -> Self {
        Self { db }
    }

    pub async fn save(&self, process: &Process) -> Result<()> {
        let doc = serde_json::to_value(process)?;
        self.db
            .instance
            .insert_documents(Table::Process, vec![doc])
            .await
    }

    pub async fn load(&self, id: &str) -> Result<Option<Process>> {
        let docs = self
            .db
            .instance
            .fetch(Table::Process, &[id.to_string()], None)
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn load_most_recent(&self, count: usize) -> Result<Vec<Process>> {
        let mut args = PluginArgs::new();
        args.insert("history_limit".to_string(), (count as u64).into());

        let docs = self
            .db
            .instance
            .fetch(Table::Process, &[], Some(&args))
            .await?;

        let mut rows = Vec::with_capacity(docs.len());
        for doc in docs {
            rows.push(serde_json::from_value(doc)?);
        }
        Ok(rows)
    }
}
