use tracing::warn;

use crate::plugin::traits::Table;
use crate::plugins::db::memory::MemoryDb;
use crate::plugins::fixtures;

/// The mock document store is the in-memory store preloaded with the
/// fixture corpus the mock vector store answers with.
pub fn with_fixtures() -> MemoryDb {
    let db = MemoryDb::new();

    if let Err(err) = db.insert_all(Table::Engram, fixtures::engram_docs()) {
        warn!("fixture engrams failed to load: {err}");
    }
    if let Err(err) = db.insert_all(Table::Meta, fixtures::meta_docs()) {
        warn!("fixture metas failed to load: {err}");
    }

    db
}
