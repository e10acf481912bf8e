//! Prompt builders for consolidation.

pub fn render_gen_indices(engram_render: &str) -> String {
    format!(
        "<instructions>\nGenerate lookup phrases of five to eight words that a reader \
might use to find the memory below. Return them as index_text_array.\n</instructions>\n\
<memory>\n{engram_render}</memory>\n"
    )
}

pub fn render_summary(observation_render: &str) -> String {
    format!(
        "<instructions>\nSummarize the observation below in a few sentences, keeping \
the concrete facts.\n</instructions>\n<observation>\n{observation_render}</observation>\n"
    )
}
