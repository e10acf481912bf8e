//! Validate prompt assembly.

use std::fmt::Write;

use crate::types::{Engram, Meta, Response};

pub fn render_validate(response: &Response, engrams: &[Engram], metas: &[Meta]) -> String {
    let mut out = String::from(
        "<instructions>\nExtract memorable facts from the article below, scored for \
relevancy and accuracy against the provided sources on a 0-4 scale. Return TOML: one \
[meta] table and one [[engram]] table per fact, each with content, is_native_source = \
false, locations, source_ids, meta_ids, accuracy, and relevancy. If nothing is worth \
remembering, return a single [not_memorable] table instead.\n</instructions>\n",
    );

    if !metas.is_empty() {
        out.push_str("<source_overviews>\n");
        for meta in metas {
            let _ = write!(
                out,
                "<overview id=\"{}\">{}</overview>\n",
                meta.id, meta.summary_full.text
            );
        }
        out.push_str("</source_overviews>\n");
    }

    if !engrams.is_empty() {
        out.push_str("<sources>\n");
        for engram in engrams {
            out.push_str(&engram.render());
        }
        out.push_str("</sources>\n");
    }

    let _ = write!(out, "<article>\n{}\n</article>\n", response.response);
    out
}
