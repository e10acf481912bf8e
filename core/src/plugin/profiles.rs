use std::collections::HashSet;

use toml::Table;

use crate::{EngramError, Result};

/// Required version of the profile format.
pub const PROFILE_VERSION: f64 = 1.0;

/// Named backend profiles, parsed from TOML.
///
/// A profile of `type = "pointer"` aliases another profile through its
/// `ptr` field; resolution follows pointers and rejects cycles.
#[derive(Debug)]
pub struct Profiles {
    data: Table,
}

impl Profiles {
    pub fn parse(text: &str) -> Result<Self> {
        let data: Table = text
            .parse()
            .map_err(|err| EngramError::Config(format!("invalid profile TOML: {err}")))?;

        let version = data
            .get("version")
            .and_then(|v| v.as_float())
            .ok_or_else(|| EngramError::Config("profile file is missing 'version'".to_string()))?;
        if version != PROFILE_VERSION {
            return Err(EngramError::Config(format!(
                "incompatible profile version: expected {PROFILE_VERSION}, found {version}"
            )));
        }

        Ok(Self { data })
    }

    /// The profiles shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_PROFILES)
    }

    /// The entry exactly as written, without pointer resolution. Pointer
    /// tables may carry flags of their own (e.g. `generate_mock_data`).
    pub fn raw(&self, name: &str) -> Option<&Table> {
        self.data.get(name).and_then(|v| v.as_table())
    }

    /// Retrieve a profile table by name, following pointer profiles until a
    /// real profile is found.
    pub fn resolve(&self, name: &str) -> Result<&Table> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = name;

        loop {
            if !visited.insert(current) {
                return Err(EngramError::Config(format!(
                    "cyclic pointer reference for profile '{name}'"
                )));
            }

            let profile = self
                .data
                .get(current)
                .and_then(|v| v.as_table())
                .ok_or_else(|| EngramError::Config(format!("no profile named '{current}'")))?;

            if profile.get("type").and_then(|v| v.as_str()) == Some("pointer") {
                current = profile
                    .get("ptr")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        EngramError::Config(format!(
                            "pointer profile '{current}' does not contain a 'ptr' key"
                        ))
                    })?;
                continue;
            }

            return Ok(profile);
        }
    }
}

const BUILTIN_PROFILES: &str = r#"
version = 1.0

# Deterministic backends; recorded runs replay byte for byte.
[mock]
name = "mock"

[mock.llm.retrieve_gen_conversation_direction]
name = "mock"

[mock.llm.retrieve_prompt_analysis]
name = "mock"

[mock.llm.retrieve_gen_index]
name = "mock"

[mock.llm.response_main]
name = "mock"
model = "mock-llm"

[mock.llm.validate]
name = "mock"

[mock.llm.summary]
name = "mock"

[mock.llm.gen_indices]
name = "mock"

[mock.llm.sense_initial_summary]
name = "mock"

[mock.llm.sense_scan]
name = "mock"

[mock.llm.sense_full_summary]
name = "mock"

[mock.embedding.gen_embed]
name = "mock"

[mock.vector_db.db]
name = "mock"
threshold = 0.5
n_results = 10

[mock.db.document]
name = "mock"

# Same wiring as mock but every call's input and output is captured for
# later replay.
[mock-record]
type = "pointer"
ptr = "mock"
generate_mock_data = true

[standard]
name = "standard"

[standard.llm.retrieve_gen_conversation_direction]
name = "openai"
model = "gpt-4o-mini"

[standard.llm.retrieve_prompt_analysis]
name = "openai"
model = "gpt-4o-mini"

[standard.llm.retrieve_gen_index]
name = "openai"
model = "gpt-4o-mini"

[standard.llm.response_main]
name = "openai"
model = "gpt-4o"

[standard.llm.validate]
name = "openai"
model = "gpt-4o-mini"

[standard.llm.summary]
name = "openai"
model = "gpt-4o-mini"

[standard.llm.gen_indices]
name = "openai"
model = "gpt-4o-mini"

[standard.llm.sense_initial_summary]
name = "openai"
model = "gpt-4o"

[standard.llm.sense_scan]
name = "openai"
model = "gpt-4o"

[standard.llm.sense_full_summary]
name = "openai"
model = "gpt-4o-mini"

[standard.embedding.gen_embed]
name = "openai"
model = "text-embedding-3-small"

[standard.vector_db.db]
name = "memory"
threshold = 0.5
n_results = 10

[standard.db.document]
name = "memory"

[default]
type = "pointer"
ptr = "mock"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_parse() {
        let profiles = Profiles::builtin().unwrap();
        let mock = profiles.resolve("mock").unwrap();
        assert!(mock.contains_key("llm"));
    }

    #[test]
    fn pointer_profile_resolves_to_target() {
        let profiles = Profiles::builtin().unwrap();
        let via_pointer = profiles.resolve("default").unwrap();
        let direct = profiles.resolve("mock").unwrap();
        assert_eq!(via_pointer, direct);
    }

    #[test]
    fn missing_version_is_rejected() {
        let err = Profiles::parse("[mock]\nname = \"mock\"\n").unwrap_err();
        assert!(matches!(err, crate::EngramError::Config(_)));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let err = Profiles::parse("version = 2.0\n").unwrap_err();
        assert!(matches!(err, crate::EngramError::Config(_)));
    }

    #[test]
    fn pointer_cycle_is_rejected() {
        let text = r#"
version = 1.0

[a]
type = "pointer"
ptr = "b"

[b]
type = "pointer"
ptr = "a"
"#;
        let profiles = Profiles::parse(text).unwrap();
        let err = profiles.resolve("a").unwrap_err();
        assert!(matches!(err, crate::EngramError::Config(_)));
    }

    #[test]
    fn self_pointer_is_rejected() {
        let text = r#"
version = 1.0

[a]
type = "pointer"
ptr = "a"
"#;
        let profiles = Profiles::parse(text).unwrap();
        assert!(profiles.resolve("a").is_err());
    }
}
