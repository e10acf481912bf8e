use crate::plugin::traits::{Db, Plugin, Table};
use crate::types::FileNode;
use crate::Result;

pub struct DocumentRepository {
    db: Plugin<dyn Db>,
}

impl DocumentRepository {
    pub fn new(db: Plugin<dyn Db>) -> Self {
        Self { db }
    }

    pub async fn save(&self, node: &FileNode) -> Result<()> {
        let doc = serde_json::to_value(node)?;
        self.db
            .instance
            .insert_documents(Table::Document, vec![doc])
            .await
    }

    pub async fn load(&self, id: &str) -> Result<Option<FileNode>> {
        let docs = self
            .db
            .instance
            .fetch(Table::Document, &[id.to_string()], None)
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }
}
