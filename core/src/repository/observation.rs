use serde_json::Value;
use toml::Table;

use crate::plugin::manager::toml_to_json;
use crate::plugin::traits::{Db, Plugin, Table as DbTable};
use crate::types::{Observation, Response};
use crate::{EngramError, Result};

/// Observation persistence plus the TOML shaping duties of the codify
/// pipeline: validating the shape a validate-LLM returned and filling the
/// defaults that tie a new observation back to the response it came from.
pub struct ObservationRepository {
    db: Plugin<dyn Db>,
}

impl ObservationRepository {
    pub fn new(db: Plugin<dyn Db>) -> Self {
        Self { db }
    }

    pub async fn save(&self, observation: &Observation) -> Result<()> {
        let doc = serde_json::to_value(observation)?;
        self.db
            .instance
            .insert_documents(DbTable::Observation, vec![doc])
            .await
    }

    pub async fn load(&self, id: &str) -> Result<Option<Observation>> {
        let docs = self
            .db
            .instance
            .fetch(DbTable::Observation, &[id.to_string()], None)
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub fn load_dict(&self, doc: Value) -> Result<Observation> {
        Ok(serde_json::from_value(doc)?)
    }

    /// Enforce the shape contract on a validate response.
    ///
    /// `engram` must be a list; every engram carries `content` (string) and
    /// `is_native_source` (bool); derived engrams additionally carry
    /// `locations`, `source_ids`, `meta_ids` (lists) and integer
    /// `accuracy` / `relevancy` scores.
    pub fn validate_toml_dict(dict: &Table) -> Result<()> {
        let engrams = dict
            .get("engram")
            .ok_or_else(|| EngramError::Validation("missing [[engram]] tables".to_string()))?
            .as_array()
            .ok_or_else(|| EngramError::Validation("'engram' is not a list".to_string()))?;

        for (i, entry) in engrams.iter().enumerate() {
            let engram = entry.as_table().ok_or_else(|| {
                EngramError::Validation(format!("engram {i} is not a table"))
            })?;

            if !engram.get("content").map_or(false, |v| v.is_str()) {
                return Err(EngramError::Validation(format!(
                    "engram {i} is missing string 'content'"
                )));
            }
            let native = engram
                .get("is_native_source")
                .and_then(|v| v.as_bool())
                .ok_or_else(|| {
                    EngramError::Validation(format!(
                        "engram {i} is missing bool 'is_native_source'"
                    ))
                })?;

            if !native {
                for key in ["locations", "source_ids", "meta_ids"] {
                    if !engram.get(key).map_or(false, |v| v.is_array()) {
                        return Err(EngramError::Validation(format!(
                            "derived engram {i} is missing list '{key}'"
                        )));
                    }
                }
                for key in ["accuracy", "relevancy"] {
                    if !engram.get(key).map_or(false, |v| v.is_integer()) {
                        return Err(EngramError::Validation(format!(
                            "derived engram {i} is missing integer '{key}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Fill defaults against the response the observation was distilled
    /// from: ids, timestamps, and the source/location pair that points back
    /// at the generating model.
    pub fn normalize_toml_dict(dict: &mut Table, response: &Response) {
        let now = chrono::Utc::now().timestamp();
        let model_location = format!("llm://{}", response.model);

        let meta = dict
            .entry("meta".to_string())
            .or_insert_with(|| toml::Value::Table(Table::new()));
        let meta_id = if let Some(meta) = meta.as_table_mut() {
            let meta_id = meta
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            meta.insert("id".to_string(), toml::Value::String(meta_id.clone()));
            meta.entry("type".to_string())
                .or_insert_with(|| toml::Value::String("prompt".to_string()));
            meta.entry("source_ids".to_string()).or_insert_with(|| {
                toml::Value::Array(vec![toml::Value::String(response.hash.clone())])
            });
            meta.entry("locations".to_string()).or_insert_with(|| {
                toml::Value::Array(vec![toml::Value::String(model_location.clone())])
            });

            // summary_full becomes an Index with no embedding yet.
            let summary = match meta.get("summary_full") {
                Some(toml::Value::String(text)) => Some(text.clone()),
                Some(toml::Value::Table(table)) => table
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                _ => None,
            };
            let mut index = Table::new();
            index.insert(
                "text".to_string(),
                toml::Value::String(summary.unwrap_or_default()),
            );
            meta.insert("summary_full".to_string(), toml::Value::Table(index));
            meta_id
        } else {
            uuid::Uuid::new_v4().to_string()
        };

        if let Some(engrams) = dict.get_mut("engram").and_then(|v| v.as_array_mut()) {
            for entry in engrams {
                let Some(engram) = entry.as_table_mut() else {
                    continue;
                };
                engram.entry("id".to_string()).or_insert_with(|| {
                    toml::Value::String(uuid::Uuid::new_v4().to_string())
                });
                engram
                    .entry("created_date".to_string())
                    .or_insert(toml::Value::Integer(now));
                // Native and derived engrams both inherit the response's
                // source/location pair and meta when not previously set.
                engram.entry("source_ids".to_string()).or_insert_with(|| {
                    toml::Value::Array(vec![toml::Value::String(response.hash.clone())])
                });
                engram.entry("locations".to_string()).or_insert_with(|| {
                    toml::Value::Array(vec![toml::Value::String(model_location.clone())])
                });
                engram.entry("meta_ids".to_string()).or_insert_with(|| {
                    toml::Value::Array(vec![toml::Value::String(meta_id.clone())])
                });
            }
        }
    }

    /// Build an Observation from a validated, normalized TOML payload.
    pub fn load_toml_dict(dict: &Table, parent_id: Option<String>) -> Result<Observation> {
        let meta_value = dict
            .get("meta")
            .ok_or_else(|| EngramError::Validation("missing [meta] table".to_string()))?;
        let meta = serde_json::from_value(toml_to_json(meta_value))?;

        let mut engram_list = Vec::new();
        if let Some(engrams) = dict.get("engram").and_then(|v| v.as_array()) {
            for entry in engrams {
                engram_list.push(serde_json::from_value(toml_to_json(entry))?);
            }
        }

        Ok(Observation::new(parent_id, meta, engram_list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConversationDirection, PromptAnalysis, RetrieveResult};

    fn response() -> Response {
        Response::new(
            "The podcast covers markets and politics.",
            RetrieveResult {
                ask_id: "ask-1".to_string(),
                engram_id_array: vec![],
                conversation_direction: ConversationDirection::default(),
            },
            "tell me about it",
            PromptAnalysis::default(),
            "mock-llm",
        )
    }

    fn parsed(text: &str) -> Table {
        text.parse().unwrap()
    }

    #[test]
    fn validate_accepts_well_formed_derived_engrams() {
        let dict = parsed(
            r#"
[meta]
summary_initial = "s"

[[engram]]
content = "fact"
is_native_source = false
locations = ["llm://mock"]
source_ids = ["abc"]
meta_ids = ["m1"]
accuracy = 4
relevancy = 4
"#,
        );
        ObservationRepository::validate_toml_dict(&dict).unwrap();
    }

    #[test]
    fn validate_rejects_derived_engram_without_scores() {
        let dict = parsed(
            r#"
[[engram]]
content = "fact"
is_native_source = false
locations = []
source_ids = []
meta_ids = []
"#,
        );
        let err = ObservationRepository::validate_toml_dict(&dict).unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }

    #[test]
    fn validate_rejects_non_list_engram() {
        let dict = parsed("engram = \"not a list\"\n");
        assert!(ObservationRepository::validate_toml_dict(&dict).is_err());
    }

    #[test]
    fn normalize_fills_response_linked_defaults() {
        let response = response();
        let mut dict = parsed(
            r#"
[meta]
summary_full = "summary text"

[[engram]]
content = "fact"
is_native_source = false
accuracy = 4
relevancy = 4
"#,
        );

        ObservationRepository::normalize_toml_dict(&mut dict, &response);

        let meta = dict["meta"].as_table().unwrap();
        assert!(meta.contains_key("id"));
        assert_eq!(
            meta["source_ids"].as_array().unwrap()[0].as_str().unwrap(),
            response.hash
        );
        assert_eq!(
            meta["locations"].as_array().unwrap()[0].as_str().unwrap(),
            "llm://mock-llm"
        );
        let summary = meta["summary_full"].as_table().unwrap();
        assert_eq!(summary["text"].as_str().unwrap(), "summary text");
        assert!(!summary.contains_key("embedding"));

        let engram = dict["engram"].as_array().unwrap()[0].as_table().unwrap();
        assert!(engram.contains_key("id"));
        assert!(engram.contains_key("created_date"));
        let source_ids = engram["source_ids"].as_array().unwrap();
        assert_eq!(source_ids.len(), 1);
        assert_eq!(source_ids[0].as_str().unwrap(), response.hash);
        assert_eq!(
            engram["meta_ids"].as_array().unwrap()[0].as_str().unwrap(),
            meta["id"].as_str().unwrap()
        );
    }

    #[test]
    fn load_builds_an_observation() {
        let response = response();
        let mut dict = parsed(
            r#"
[meta]
summary_initial = "s"
summary_full = "full summary"

[[engram]]
content = "fact one"
is_native_source = false
locations = ["llm://mock-llm"]
source_ids = ["x"]
meta_ids = ["m"]
accuracy = 4
relevancy = 4
"#,
        );
        ObservationRepository::normalize_toml_dict(&mut dict, &response);
        let observation =
            ObservationRepository::load_toml_dict(&dict, Some("prompt-1".to_string())).unwrap();

        assert_eq!(observation.parent_id.as_deref(), Some("prompt-1"));
        assert_eq!(observation.engram_list.len(), 1);
        assert_eq!(observation.engram_list[0].content, "fact one");
        assert_eq!(observation.meta.summary_full.text, "full summary");
        assert!(observation.meta.summary_full.embedding.is_none());
    }
}
