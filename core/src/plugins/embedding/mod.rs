pub mod mock;
pub mod openai;

use std::sync::Arc;

pub use mock::MockEmbedding;
pub use openai::OpenAiEmbedding;

use crate::plugin::recording::Recorder;
use crate::plugin::traits::Embedding;
use crate::{EngramError, Result};

pub fn build(name: &str, recorder: &Arc<Recorder>) -> Result<Arc<dyn Embedding>> {
    match name {
        "mock" => Ok(Arc::new(MockEmbedding::new(Arc::clone(recorder)))),
        "openai" => Ok(Arc::new(OpenAiEmbedding::from_env()?)),
        other => Err(EngramError::PluginLoad(format!(
            "unknown embedding backend '{other}'"
        ))),
    }
}
