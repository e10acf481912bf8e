use std::path::PathBuf;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::{EngramError, Result};

/// Filesystem root for plugin data (recordings, disk-backed stores).
pub const PLUGIN_PATHS_ENV: &str = "ENGRAMIC_PLUGIN_PATHS";

const RECORDING_FILE: &str = "mock_data.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    Off,
    /// Mock backends answer from recorded data.
    Replay,
    /// Every call's input key and output value are captured for later replay.
    Record,
}

/// Recorded plugin traffic, keyed by `{caller}|{usage}|{index}`.
///
/// The key identifies one logical call site: the calling function, the
/// profile usage slot it went through, and the position within a parallel
/// batch. Replaying the same inputs therefore yields byte-identical outputs.
pub struct Recorder {
    mode: RecordMode,
    data: DashMap<String, Value>,
    path: Option<PathBuf>,
}

impl Recorder {
    pub fn new(mode: RecordMode) -> Self {
        let path = std::env::var(PLUGIN_PATHS_ENV)
            .ok()
            .map(|root| PathBuf::from(root).join(RECORDING_FILE));

        let data = DashMap::new();
        if mode == RecordMode::Replay {
            if let Some(path) = &path {
                match std::fs::read_to_string(path) {
                    Ok(text) => match serde_json::from_str::<serde_json::Map<String, Value>>(&text)
                    {
                        Ok(map) => {
                            info!("loaded {} recorded plugin calls", map.len());
                            for (key, value) in map {
                                data.insert(key, value);
                            }
                        }
                        Err(err) => warn!("recorded data at {path:?} is not valid JSON: {err}"),
                    },
                    // No file means the built-in fixtures answer instead.
                    Err(_) => {}
                }
            }
        }

        Self { mode, data, path }
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    pub fn key(caller: &str, usage: &str, index: usize) -> String {
        format!("{caller}|{usage}|{index}")
    }

    pub fn lookup(&self, key: &str) -> Option<Value> {
        if self.mode != RecordMode::Replay {
            return None;
        }
        self.data.get(key).map(|v| v.clone())
    }

    pub fn record(&self, key: String, value: Value) {
        if self.mode == RecordMode::Record {
            self.data.insert(key, value);
        }
    }

    /// Write captured calls to disk. A no-op outside record mode.
    pub fn flush(&self) -> Result<()> {
        if self.mode != RecordMode::Record {
            return Ok(());
        }
        let Some(path) = &self.path else {
            return Err(EngramError::Config(format!(
                "{PLUGIN_PATHS_ENV} must be set to record mock data"
            )));
        };

        let mut map = serde_json::Map::new();
        for entry in self.data.iter() {
            map.insert(entry.key().clone(), entry.value().clone());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&Value::Object(map))?)?;
        info!("recorded plugin data written to {path:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_returns_recorded_values_only_in_replay_mode() {
        let recorder = Recorder {
            mode: RecordMode::Replay,
            data: DashMap::new(),
            path: None,
        };
        recorder
            .data
            .insert(Recorder::key("submit", "validate", 0), Value::from("x"));

        assert_eq!(
            recorder.lookup(&Recorder::key("submit", "validate", 0)),
            Some(Value::from("x"))
        );
        assert_eq!(recorder.lookup(&Recorder::key("submit", "validate", 1)), None);
    }

    #[test]
    fn record_mode_captures() {
        let recorder = Recorder {
            mode: RecordMode::Record,
            data: DashMap::new(),
            path: None,
        };
        recorder.record(Recorder::key("a", "b", 0), Value::from(1));
        assert_eq!(recorder.data.len(), 1);
    }
}
