use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Init,
    Prep,
    Running,
    Done,
    Failed,
}

/// A multi-pass workflow over a document or prompt. Passes run in order;
/// a failing pass records its message and parks the process in `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: String,
    pub process_name: String,

    #[serde(default)]
    pub pass_array: Vec<String>,

    #[serde(default)]
    pub current_pass: usize,

    #[serde(default)]
    pub percent_complete: f32,

    pub status: ProcessStatus,

    /// Scratch state carried between passes.
    #[serde(default)]
    pub memory: Value,

    #[serde(default)]
    pub failed_message: Option<String>,

    #[serde(default)]
    pub current_tracking_id: Option<String>,
}

impl Process {
    pub fn new(process_name: impl Into<String>, pass_array: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            process_name: process_name.into(),
            pass_array,
            current_pass: 0,
            percent_complete: 0.0,
            status: ProcessStatus::Init,
            memory: Value::Null,
            failed_message: None,
            current_tracking_id: None,
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ProcessStatus::Failed;
        self.failed_message = Some(message.into());
    }
}
