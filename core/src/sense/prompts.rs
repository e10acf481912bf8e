//! Prompt builders for document scanning.

use serde_json::Value;

use crate::types::FileNode;

pub fn render_initial_scan(node: &FileNode) -> String {
    format!(
        "<instructions>\nYou are looking at the opening pages of a document. Identify \
it: subject, audience, title, format, type, table of contents, a short summary, \
author, date, and version.\n</instructions>\n<document>\nfile_path: {}\nfile_name: {}\n</document>\n",
        node.file_path(),
        node.file_name
    )
}

pub fn render_scan_page(initial_scan: &Value, page: usize) -> String {
    format!(
        "<instructions>\nTranscribe this page, annotating its structure with only \
these tags: <section>, <h1>, <h3>, <engram>, <p>, <img>, <page>, <header>, <chapter>, \
<title>. Wrap each self-contained passage in <engram>.\n</instructions>\n\
<document_context>\n{initial_scan}\npage_number: {}\n</document_context>\n",
        page + 1
    )
}

pub fn render_full_summary(initial_scan: &Value, full_text: &str) -> String {
    format!(
        "<instructions>\nWrite a full summary of the document and a comma-separated \
keyword list. Return summary_full and keywords.\n</instructions>\n\
<document_context>\n{initial_scan}\n</document_context>\n<full_text>\n{full_text}\n</full_text>\n"
    )
}
