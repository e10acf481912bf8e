use serde::{Deserialize, Serialize};

use crate::types::retrieve::{PromptAnalysis, RetrieveResult};

/// A generated answer together with everything needed to validate it later:
/// the retrieval set it was grounded on, the prompt, and a content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub response: String,
    pub retrieve_result: RetrieveResult,
    pub prompt_str: String,
    pub analysis: PromptAnalysis,
    pub model: String,

    /// md5 of `response`; doubles as the source id for derived engrams.
    pub hash: String,

    /// Unix seconds.
    #[serde(default)]
    pub response_time: i64,
}

impl Response {
    pub fn new(
        response: impl Into<String>,
        retrieve_result: RetrieveResult,
        prompt_str: impl Into<String>,
        analysis: PromptAnalysis,
        model: impl Into<String>,
    ) -> Self {
        let response = response.into();
        let hash = format!("{:x}", md5::compute(&response));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            response,
            retrieve_result,
            prompt_str: prompt_str.into(),
            analysis,
            model: model.into(),
            hash,
            response_time: chrono::Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::retrieve::ConversationDirection;

    #[test]
    fn hash_is_md5_of_response_text() {
        let response = Response::new(
            "The podcast is about politics.",
            RetrieveResult {
                ask_id: "ask".to_string(),
                engram_id_array: vec![],
                conversation_direction: ConversationDirection::default(),
            },
            "what is it about",
            PromptAnalysis::default(),
            "mock",
        );

        let expected = format!("{:x}", md5::compute("The podcast is about politics."));
        assert_eq!(response.hash, expected);
    }
}
