use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::plugin::profiles::Profiles;
use crate::plugin::recording::{RecordMode, Recorder};
use crate::plugin::traits::{Db, Embedding, Llm, Plugin, PluginArgs, VectorDb};
use crate::plugins;
use crate::{EngramError, Result};

/// Resolves the active profile and hands out invocation handles.
///
/// Backend instances are cached per (category, backend name) so every usage
/// slot that names the same backend shares one instance - the in-memory
/// document store must look the same to every repository.
pub struct PluginManager {
    profile: toml::Table,
    profile_name: String,
    recorder: Arc<Recorder>,
    llms: DashMap<String, Arc<dyn Llm>>,
    embeddings: DashMap<String, Arc<dyn Embedding>>,
    vector_dbs: DashMap<String, Arc<dyn VectorDb>>,
    dbs: DashMap<String, Arc<dyn Db>>,
}

impl PluginManager {
    pub fn new(profile_name: &str) -> Result<Self> {
        Self::with_profiles(&Profiles::builtin()?, profile_name)
    }

    pub fn with_profiles(profiles: &Profiles, profile_name: &str) -> Result<Self> {
        let profile = profiles.resolve(profile_name)?.clone();

        let record = profiles
            .raw(profile_name)
            .and_then(|t| t.get("generate_mock_data"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let mode = if record {
            RecordMode::Record
        } else if profile.get("name").and_then(|v| v.as_str()) == Some("mock") {
            RecordMode::Replay
        } else {
            RecordMode::Off
        };

        info!("profile '{profile_name}' loaded (recording: {mode:?})");

        Ok(Self {
            profile,
            profile_name: profile_name.to_string(),
            recorder: Arc::new(Recorder::new(mode)),
            llms: DashMap::new(),
            embeddings: DashMap::new(),
            vector_dbs: DashMap::new(),
            dbs: DashMap::new(),
        })
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        Arc::clone(&self.recorder)
    }

    pub fn get_llm(&self, usage: &str) -> Result<Plugin<dyn Llm>> {
        let (name, args) = self.usage_entry("llm", usage)?;
        let instance = match self.llms.get(&name) {
            Some(instance) => Arc::clone(&instance),
            None => {
                let built = plugins::llm::build(&name, &self.recorder)?;
                self.llms.insert(name.clone(), Arc::clone(&built));
                built
            }
        };
        Ok(Plugin {
            instance,
            args,
            usage: usage.to_string(),
        })
    }

    pub fn get_embedding(&self, usage: &str) -> Result<Plugin<dyn Embedding>> {
        let (name, args) = self.usage_entry("embedding", usage)?;
        let instance = match self.embeddings.get(&name) {
            Some(instance) => Arc::clone(&instance),
            None => {
                let built = plugins::embedding::build(&name, &self.recorder)?;
                self.embeddings.insert(name.clone(), Arc::clone(&built));
                built
            }
        };
        Ok(Plugin {
            instance,
            args,
            usage: usage.to_string(),
        })
    }

    pub fn get_vector_db(&self, usage: &str) -> Result<Plugin<dyn VectorDb>> {
        let (name, args) = self.usage_entry("vector_db", usage)?;
        let instance = match self.vector_dbs.get(&name) {
            Some(instance) => Arc::clone(&instance),
            None => {
                let built = plugins::vector::build(&name)?;
                self.vector_dbs.insert(name.clone(), Arc::clone(&built));
                built
            }
        };
        Ok(Plugin {
            instance,
            args,
            usage: usage.to_string(),
        })
    }

    pub fn get_db(&self, usage: &str) -> Result<Plugin<dyn Db>> {
        let (name, args) = self.usage_entry("db", usage)?;
        let instance = match self.dbs.get(&name) {
            Some(instance) => Arc::clone(&instance),
            None => {
                let built = plugins::db::build(&name)?;
                self.dbs.insert(name.clone(), Arc::clone(&built));
                built
            }
        };
        Ok(Plugin {
            instance,
            args,
            usage: usage.to_string(),
        })
    }

    /// Persist captured plugin traffic, if recording.
    pub fn flush_recording(&self) -> Result<()> {
        self.recorder.flush()
    }

    fn usage_entry(&self, category: &str, usage: &str) -> Result<(String, PluginArgs)> {
        let entry = self
            .profile
            .get(category)
            .and_then(|v| v.as_table())
            .and_then(|cat| cat.get(usage))
            .and_then(|v| v.as_table())
            .ok_or_else(|| {
                EngramError::Config(format!(
                    "profile '{}' has no {category}.{usage} entry",
                    self.profile_name
                ))
            })?;

        let name = entry
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                EngramError::Config(format!(
                    "profile entry {category}.{usage} is missing 'name'"
                ))
            })?
            .to_string();

        let mut args = PluginArgs::new();
        for (key, value) in entry {
            args.insert(key.clone(), toml_to_json(value));
        }
        // Backends see which slot they were invoked under (the mock keys its
        // canned data by usage).
        args.insert("usage".to_string(), serde_json::Value::from(usage));
        Ok((name, args))
    }
}

pub(crate) fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::from(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::from(*i),
        toml::Value::Float(f) => serde_json::Value::from(*f),
        toml::Value::Boolean(b) => serde_json::Value::from(*b),
        toml::Value::Datetime(dt) => serde_json::Value::from(dt.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
    }
}
