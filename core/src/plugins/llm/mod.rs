pub mod mock;
pub mod openai;

use std::sync::Arc;

pub use mock::MockLlm;
pub use openai::{OpenAiConfig, OpenAiLlm};

use crate::plugin::recording::Recorder;
use crate::plugin::traits::Llm;
use crate::{EngramError, Result};

pub fn build(name: &str, recorder: &Arc<Recorder>) -> Result<Arc<dyn Llm>> {
    match name {
        "mock" => Ok(Arc::new(MockLlm::new(Arc::clone(recorder)))),
        "openai" => Ok(Arc::new(OpenAiLlm::from_env()?)),
        other => Err(EngramError::PluginLoad(format!(
            "unknown llm backend '{other}'"
        ))),
    }
}

/// Models wrap structured replies in markdown fences often enough that every
/// backend strips them before handing text back.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the language tag on the opening fence, then the closing fence.
    let rest = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::strip_code_fences;

    #[test]
    fn strips_fence_with_language_tag() {
        let fenced = "```toml\n[meta]\nid = \"x\"\n```";
        assert_eq!(strip_code_fences(fenced), "[meta]\nid = \"x\"");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(strip_code_fences("hello"), "hello");
    }
}
