use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EngramError, Result};

/// A user or internal prompt, immutable once published to the bus.
///
/// `repo_ids_filters` follows a three-way contract: `None` means "the default
/// `null` repo only", a non-empty list narrows retrieval to those repos, and
/// an empty list is rejected outright at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub prompt_str: String,
    pub prompt_id: String,

    #[serde(default)]
    pub repo_ids_filters: Option<Vec<String>>,

    #[serde(default)]
    pub training_mode: bool,

    #[serde(default)]
    pub is_lesson: bool,

    pub tracking_id: String,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub thinking_level: Option<String>,

    #[serde(default)]
    pub target_single_file: Option<String>,

    #[serde(default)]
    pub input_data: HashMap<String, Value>,
}

/// Reserved repo name for memories that belong to no repository.
pub const NULL_REPO: &str = "null";

impl Prompt {
    pub fn new(
        prompt_str: impl Into<String>,
        repo_ids_filters: Option<Vec<String>>,
    ) -> Result<Self> {
        if let Some(filters) = &repo_ids_filters {
            if filters.is_empty() {
                return Err(EngramError::Validation(
                    "repo_ids_filters may not be an empty list; use None for the default repo"
                        .to_string(),
                ));
            }
        }

        Ok(Self {
            prompt_str: prompt_str.into(),
            prompt_id: uuid::Uuid::new_v4().to_string(),
            repo_ids_filters,
            training_mode: false,
            is_lesson: false,
            tracking_id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
            thinking_level: None,
            target_single_file: None,
            input_data: HashMap::new(),
        })
    }

    pub fn with_training_mode(mut self, training_mode: bool) -> Self {
        self.training_mode = training_mode;
        self
    }

    pub fn with_tracking_id(mut self, tracking_id: impl Into<String>) -> Self {
        self.tracking_id = tracking_id.into();
        self
    }

    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// The repo filters as they are handed to the vector store.
    pub fn effective_repo_filters(&self) -> Vec<String> {
        match &self.repo_ids_filters {
            Some(filters) => filters.clone(),
            None => vec![NULL_REPO.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_list_is_rejected() {
        let err = Prompt::new("x", Some(vec![])).unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }

    #[test]
    fn none_filter_resolves_to_null_repo() {
        let prompt = Prompt::new("x", None).unwrap();
        assert_eq!(prompt.effective_repo_filters(), vec![NULL_REPO.to_string()]);
    }

    #[test]
    fn explicit_filters_pass_through() {
        let prompt = Prompt::new("x", Some(vec!["repo-a".to_string()])).unwrap();
        assert_eq!(prompt.effective_repo_filters(), vec!["repo-a".to_string()]);
    }

    #[test]
    fn tracking_id_assigned_when_absent() {
        let prompt = Prompt::new("x", None).unwrap();
        assert!(!prompt.tracking_id.is_empty());
    }
}
