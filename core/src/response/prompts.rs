//! Main prompt assembly.

use std::fmt::Write;

use crate::types::{ConversationDirection, Engram, Prompt, PromptAnalysis, Response};

pub fn render_main(
    prompt: &Prompt,
    engrams: &[Engram],
    history: &[Response],
    direction: &ConversationDirection,
    analysis: &PromptAnalysis,
) -> String {
    let mut out = String::from(
        "<instructions>\nYou are Engramic. Answer the user grounded in the memories \
below; do not invent sources. Match the requested response length.\n</instructions>\n",
    );

    let _ = write!(
        out,
        "<working_memory>\nuser_intent: {}\n{}\n</working_memory>\n",
        direction.user_intent, direction.working_memory
    );

    if !analysis.response_length.is_empty() {
        let _ = write!(
            out,
            "<analysis>\nresponse_length: {}\nprompt_type: {}\n</analysis>\n",
            analysis.response_length, analysis.user_prompt_type
        );
    }

    if !engrams.is_empty() {
        out.push_str("<memories>\n");
        for engram in engrams {
            out.push_str(&engram.render());
        }
        out.push_str("</memories>\n");
    }

    if !history.is_empty() {
        out.push_str("<history>\n");
        for row in history {
            let _ = write!(
                out,
                "<exchange>\n<user>{}</user>\n<engramic>{}</engramic>\n</exchange>\n",
                row.prompt_str, row.response
            );
        }
        out.push_str("</history>\n");
    }

    let _ = write!(out, "<user_prompt>\n{}\n</user_prompt>\n", prompt.prompt_str);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RetrieveResult;

    #[test]
    fn renders_engrams_and_prompt() {
        let prompt = Prompt::new("what is this about", None).unwrap();
        let engram = Engram::new(
            vec!["file:///doc".to_string()],
            vec!["src".to_string()],
            "a fact",
            true,
        );
        let direction = ConversationDirection {
            user_intent: "learn".to_string(),
            ..Default::default()
        };

        let rendered = render_main(
            &prompt,
            &[engram],
            &[],
            &direction,
            &PromptAnalysis::default(),
        );
        assert!(rendered.contains("a fact"));
        assert!(rendered.contains("what is this about"));
        assert!(rendered.contains("user_intent: learn"));
    }

    #[test]
    fn includes_history_exchanges() {
        let prompt = Prompt::new("next question", None).unwrap();
        let history = vec![Response::new(
            "previous answer",
            RetrieveResult {
                ask_id: "a".to_string(),
                engram_id_array: vec![],
                conversation_direction: ConversationDirection::default(),
            },
            "previous question",
            PromptAnalysis::default(),
            "mock",
        )];

        let rendered = render_main(
            &prompt,
            &[],
            &history,
            &ConversationDirection::default(),
            &PromptAnalysis::default(),
        );
        assert!(rendered.contains("previous question"));
        assert!(rendered.contains("previous answer"));
    }
}
