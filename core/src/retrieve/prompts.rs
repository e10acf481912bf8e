//! Prompt builders for the retrieve stages.

use std::fmt::Write;

use crate::types::{Meta, Prompt, Response};

pub fn render_direction(prompt: &Prompt, history: &[Response]) -> String {
    let mut out = String::from(
        "<instructions>\nReview the user input and report where the conversation is heading. \
Return user_intent as a keyword-rich phrase, working_memory as structured variables \
(never prose), and perform_research when the answer needs source material.\n</instructions>\n",
    );

    let _ = write!(
        out,
        "<input>\n<current_user_input>\n{}\n</current_user_input>\n",
        prompt.prompt_str
    );
    for row in history {
        let _ = write!(
            out,
            "<previous_exchange>\n<user_previous_prompt>{}</user_previous_prompt>\n\
<engramic_previous_working_memory>{}</engramic_previous_working_memory>\n\
<engramic_previous_response>{}</engramic_previous_response>\n</previous_exchange>\n",
            row.prompt_str,
            row.retrieve_result.conversation_direction.working_memory,
            row.response
        );
    }
    out.push_str("</input>\n");
    out
}

pub fn render_analysis(prompt: &Prompt, metas: &[Meta]) -> String {
    let mut out = String::from(
        "<instructions>\nClassify the user prompt. Return response_length \
(short|medium|long) and user_prompt_type.\n</instructions>\n",
    );
    render_domain(&mut out, metas);
    let _ = write!(out, "<user_prompt>\n{}\n</user_prompt>\n", prompt.prompt_str);
    out
}

pub fn render_gen_indices(prompt: &Prompt, metas: &[Meta]) -> String {
    let mut out = String::from(
        "<instructions>\nGenerate lookup phrases of five to eight words that would \
locate memory relevant to the user prompt. Return them as index_text_array, most \
important first.\n</instructions>\n",
    );
    render_domain(&mut out, metas);
    let _ = write!(out, "<user_prompt>\n{}\n</user_prompt>\n", prompt.prompt_str);
    out
}

fn render_domain(out: &mut String, metas: &[Meta]) {
    if metas.is_empty() {
        return;
    }
    out.push_str("<domain_knowledge>\n");
    for meta in metas {
        let _ = write!(
            out,
            "<summary keywords=\"{}\">{}</summary>\n",
            meta.keywords.join(","),
            meta.summary_full.text
        );
    }
    out.push_str("</domain_knowledge>\n");
}
