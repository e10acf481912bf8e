pub mod memory;
pub mod mock;
#[cfg(feature = "rocks")]
pub mod rocks;

use std::sync::Arc;

pub use memory::MemoryDb;

use crate::plugin::traits::Db;
use crate::{EngramError, Result};

pub fn build(name: &str) -> Result<Arc<dyn Db>> {
    match name {
        "mock" => Ok(Arc::new(mock::with_fixtures())),
        "memory" => Ok(Arc::new(MemoryDb::new())),
        #[cfg(feature = "rocks")]
        "rocks" => Ok(Arc::new(rocks::RocksDb::from_env()?)),
        other => Err(EngramError::PluginLoad(format!(
            "unknown db backend '{other}'"
        ))),
    }
}
