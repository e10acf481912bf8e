pub mod memory;
pub mod mock;

use std::sync::Arc;

pub use memory::MemoryVectorDb;
pub use mock::MockVectorDb;

use crate::plugin::traits::VectorDb;
use crate::{EngramError, Result};

pub fn build(name: &str) -> Result<Arc<dyn VectorDb>> {
    match name {
        "mock" => Ok(Arc::new(MockVectorDb::new())),
        "memory" => Ok(Arc::new(MemoryVectorDb::new())),
        other => Err(EngramError::PluginLoad(format!(
            "unknown vector_db backend '{other}'"
        ))),
    }
}
