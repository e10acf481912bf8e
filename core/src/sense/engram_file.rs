//! `.engram` file ingestion.
//!
//! An engram file carries one `[meta]` table and any number of `[[engram]]`
//! tables. Parsing one yields a ready observation, so memory can be seeded
//! without a document scan.

use toml::Table;

use crate::plugin::manager::toml_to_json;
use crate::types::Observation;
use crate::{EngramError, Result};

pub fn parse_engram_file(text: &str) -> Result<Observation> {
    let mut dict: Table = text
        .parse()
        .map_err(|err| EngramError::Validation(format!("engram file is not valid TOML: {err}")))?;

    let now = chrono::Utc::now().timestamp();

    let meta = dict
        .entry("meta".to_string())
        .or_insert_with(|| toml::Value::Table(Table::new()));
    let meta_id = match meta.as_table_mut() {
        Some(meta) => {
            let meta_id = meta
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            meta.insert("id".to_string(), toml::Value::String(meta_id.clone()));
            meta.entry("type".to_string())
                .or_insert_with(|| toml::Value::String("document".to_string()));
            if !meta.get("summary_full").map_or(false, |v| v.is_table()) {
                let text = meta
                    .get("summary_full")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let mut index = Table::new();
                index.insert("text".to_string(), toml::Value::String(text));
                meta.insert("summary_full".to_string(), toml::Value::Table(index));
            }
            meta_id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let engrams = dict
        .get_mut("engram")
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| {
            EngramError::Validation("engram file has no [[engram]] tables".to_string())
        })?;
    if engrams.is_empty() {
        return Err(EngramError::Validation(
            "engram file has no [[engram]] tables".to_string(),
        ));
    }

    for entry in engrams {
        let Some(engram) = entry.as_table_mut() else {
            return Err(EngramError::Validation(
                "engram entry is not a table".to_string(),
            ));
        };
        if !engram.get("content").map_or(false, |v| v.is_str()) {
            return Err(EngramError::Validation(
                "engram entry is missing string 'content'".to_string(),
            ));
        }
        engram
            .entry("id".to_string())
            .or_insert_with(|| toml::Value::String(uuid::Uuid::new_v4().to_string()));
        engram
            .entry("is_native_source".to_string())
            .or_insert(toml::Value::Boolean(true));
        engram
            .entry("created_date".to_string())
            .or_insert(toml::Value::Integer(now));
        engram.entry("meta_ids".to_string()).or_insert_with(|| {
            toml::Value::Array(vec![toml::Value::String(meta_id.clone())])
        });
        engram
            .entry("locations".to_string())
            .or_insert_with(|| toml::Value::Array(Vec::new()));
        engram
            .entry("source_ids".to_string())
            .or_insert_with(|| toml::Value::Array(Vec::new()));
    }

    let meta = serde_json::from_value(toml_to_json(&dict["meta"]))?;
    let mut engram_list = Vec::new();
    if let Some(entries) = dict.get("engram").and_then(|v| v.as_array()) {
        for entry in entries {
            engram_list.push(serde_json::from_value(toml_to_json(entry))?);
        }
    }

    Ok(Observation::new(None, meta, engram_list))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_engram_file() {
        let text = r#"
[meta]
keywords = ["quantum"]
summary_initial = "notes"
summary_full = "A note on entanglement."

[[engram]]
content = "Entangled pairs share state."

[[engram]]
content = "Repeaters extend range."
locations = ["file:///notes.engram"]
"#;
        let observation = parse_engram_file(text).unwrap();
        assert_eq!(observation.engram_list.len(), 2);
        assert!(observation.engram_list[0].is_native_source);
        assert_eq!(
            observation.engram_list[0].meta_ids,
            vec![observation.meta.id.clone()]
        );
        assert_eq!(observation.meta.summary_full.text, "A note on entanglement.");
    }

    #[test]
    fn rejects_a_file_without_engrams() {
        let err = parse_engram_file("[meta]\nsummary_full = \"x\"\n").unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }

    #[test]
    fn rejects_engrams_without_content() {
        let text = "[[engram]]\nlocations = []\n";
        assert!(parse_engram_file(text).is_err());
    }
}
