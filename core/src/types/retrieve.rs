use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the conversation is heading, distilled from the prompt and recent
/// history before any retrieval happens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationDirection {
    pub user_intent: String,

    /// Structured state the model tracks across exchanges; shaped like code,
    /// not prose.
    #[serde(default)]
    pub working_memory: Value,

    #[serde(default)]
    pub perform_research: bool,
}

/// Outcome of analyzing the prompt alongside the metas it touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptAnalysis {
    #[serde(default)]
    pub response_length: String,

    #[serde(default)]
    pub user_prompt_type: String,

    /// Generated lookup phrases, in the order the model produced them so
    /// recorded runs replay deterministically.
    #[serde(default)]
    pub indices: Vec<String>,
}

/// The candidate set a retrieval pass hands to response generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResult {
    pub ask_id: String,
    pub engram_id_array: Vec<String>,
    pub conversation_direction: ConversationDirection,
}
