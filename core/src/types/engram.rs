use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A lookup phrase paired with its dense vector.
///
/// Indices are born with `embedding: None` and receive their vector during
/// consolidation. The phrase itself should be at least a few words long so
/// the embedding carries enough signal for semantic lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl Index {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embedding: None,
        }
    }

    pub fn with_embedding(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            embedding: Some(embedding),
        }
    }
}

/// Stable identifier for one index within one engram.
///
/// The progress tree tracks indices as children of their engram, so both the
/// producer (consolidate) and the inserter (retrieve) must derive the same id
/// without coordinating.
pub fn index_node_id(engram_id: &str, text: &str) -> String {
    format!("{:x}", md5::compute(format!("{engram_id}:{text}")))
}

/// The unit of memory: a short text with the context needed for an LLM to
/// understand its domain, plus the vector indices used to find it again.
///
/// An engram is unique by id. Two engrams with the same id arriving at
/// consolidation is a hard error, not a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engram {
    pub id: String,

    /// URIs or file paths this text came from.
    pub locations: Vec<String>,

    /// Content-hash identifiers of the originating sources.
    pub source_ids: Vec<String>,

    pub content: String,

    /// True when the text is lifted directly from a source, false when it was
    /// derived from a prior model response.
    pub is_native_source: bool,

    /// Headings, titles, page numbers - whatever grounds the content.
    #[serde(default)]
    pub context: HashMap<String, Value>,

    #[serde(default)]
    pub indices: Option<Vec<Index>>,

    #[serde(default)]
    pub meta_ids: Vec<String>,

    #[serde(default)]
    pub library_ids: Vec<String>,

    /// 0-4 score assigned by validation; None for engrams that were never
    /// validated (native scans).
    #[serde(default)]
    pub accuracy: Option<u8>,

    #[serde(default)]
    pub relevancy: Option<u8>,

    /// Unix seconds.
    #[serde(default)]
    pub created_date: i64,
}

impl Engram {
    pub fn new(
        locations: Vec<String>,
        source_ids: Vec<String>,
        content: impl Into<String>,
        is_native_source: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            locations,
            source_ids,
            content: content.into(),
            is_native_source,
            context: HashMap::new(),
            indices: None,
            meta_ids: Vec::new(),
            library_ids: Vec::new(),
            accuracy: None,
            relevancy: None,
            created_date: chrono::Utc::now().timestamp(),
        }
    }

    /// Structured text block handed to LLM prompts.
    pub fn render(&self) -> String {
        let locations = self.locations.join("\n");

        let context = if self.context.is_empty() {
            String::new()
        } else {
            let mut keys: Vec<&String> = self.context.keys().collect();
            keys.sort();
            let body = keys
                .iter()
                .map(|k| format!("{}: {}", k, render_value(&self.context[*k])))
                .collect::<Vec<_>>()
                .join("\n");
            format!("<context>\n{body}\n</context>\n")
        };

        let indices = match &self.indices {
            Some(list) if !list.is_empty() => {
                let body = list
                    .iter()
                    .map(|i| i.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("<indices>\n{body}\n</indices>\n")
            }
            _ => String::new(),
        };

        let native = if self.is_native_source {
            "The text is directly from the source."
        } else {
            "The text is derived from one or more sources."
        };

        format!(
            "<begin>\n<location>\n{locations}\n</location>\n{context}{indices}{native}\n<text>{}</text>\n</end>\n",
            self.content
        )
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_context_and_content() {
        let mut engram = Engram::new(
            vec!["file:///doc.pdf".to_string()],
            vec!["abc123".to_string()],
            "Quantum repeaters extend entanglement range.",
            true,
        );
        engram
            .context
            .insert("title".to_string(), Value::String("Networking".to_string()));

        let rendered = engram.render();
        assert!(rendered.contains("file:///doc.pdf"));
        assert!(rendered.contains("title: Networking"));
        assert!(rendered.contains("directly from the source"));
        assert!(rendered.contains("<text>Quantum repeaters extend entanglement range.</text>"));
    }

    #[test]
    fn render_marks_derived_engrams() {
        let engram = Engram::new(vec![], vec![], "derived fact", false);
        assert!(engram.render().contains("derived from one or more sources"));
    }

    #[test]
    fn index_node_ids_are_stable_and_distinct() {
        let a = index_node_id("e1", "first phrase");
        let b = index_node_id("e1", "second phrase");
        assert_eq!(a, index_node_id("e1", "first phrase"));
        assert_ne!(a, b);
        assert_ne!(a, index_node_id("e2", "first phrase"));
    }
}
