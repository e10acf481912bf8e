use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::plugin::recording::Recorder;
use crate::plugin::traits::{EmbedRequest, Embedding, PluginArgs};
use crate::{EngramError, Result};

const DIMENSIONS: usize = 8;

/// Deterministic embeddings: a digest of the input text, normalized. The
/// same string always maps to the same vector, and every vector in a run
/// has the same dimensionality.
pub struct MockEmbedding {
    recorder: Arc<Recorder>,
}

impl MockEmbedding {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder }
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let digest = md5::compute(text);
        let mut vector: Vec<f32> = digest.0[..DIMENSIONS]
            .iter()
            .map(|b| *b as f32 / 255.0)
            .collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedding for MockEmbedding {
    async fn gen_embed(&self, request: &EmbedRequest, args: &PluginArgs) -> Result<Vec<Vec<f32>>> {
        let usage = args.get("usage").and_then(|v| v.as_str()).unwrap_or("");
        let key = Recorder::key(request.caller, usage, request.index);

        if let Some(recorded) = self.recorder.lookup(&key) {
            let vectors: Vec<Vec<f32>> = serde_json::from_value(recorded)
                .map_err(|err| EngramError::Backend(format!("recorded embedding malformed: {err}")))?;
            return Ok(vectors);
        }

        let vectors: Vec<Vec<f32>> = request.strings.iter().map(|s| Self::embed_one(s)).collect();
        self.recorder.record(
            key,
            serde_json::to_value(&vectors).unwrap_or(Value::Null),
        );
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::recording::RecordMode;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_ordered() {
        let embedding = MockEmbedding::new(Arc::new(Recorder::new(RecordMode::Off)));
        let request = EmbedRequest::new(
            "test",
            vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()],
        );

        let vectors = embedding.gen_embed(&request, &PluginArgs::new()).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
        assert!(vectors.iter().all(|v| v.len() == DIMENSIONS));
    }
}
