use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::event::Topic;
use crate::executor::BoxFuture;
use crate::messages::{EngramsCreatedMsg, NodeCreatedMsg, ObservationCompleteMsg};
use crate::plugin::traits::LlmRequest;
use crate::sense::{prompts, SenseInner};
use crate::types::{Engram, FileNode, Index, Meta, MetaType, Observation};
use crate::{EngramError, Result};

/// Chunks longer than this get split again, one tag level deeper.
pub const MAX_CHUNK_SIZE: usize = 1200;

const PAGE_LIMIT: usize = 30;
const SHORT_SUMMARY_PAGE_COUNT: usize = 4;

/// Tags the page scans structure text with, outermost split first.
const SPLIT_TAGS: [&str; 3] = ["section", "h1", "h3"];

/// One document pass: rasterize, scan, chunk, summarize, observe.
pub struct Scan {
    service: Arc<SenseInner>,
    node: FileNode,
}

impl Scan {
    pub(crate) fn new(service: Arc<SenseInner>, node: FileNode) -> Self {
        Self { service, node }
    }

    pub async fn run(self) -> Result<()> {
        let service = &self.service;
        let node = &self.node;

        let pages = {
            let rasterizer = Arc::clone(&service.rasterizer);
            let node = node.clone();
            service
                .ctx
                .executor
                .blocking(move || rasterizer.rasterize(&node))
                .await?
        };
        // Zero pages fails before any model call happens.
        if pages.is_empty() {
            return Err(EngramError::Validation(format!(
                "document {} has zero pages",
                node.file_name
            )));
        }
        info!("scanning {} ({} pages)", node.file_name, pages.len());

        let initial_scan = self.initial_scan(&pages).await?;

        // Per-page structured scans, in page order.
        let total_pages = pages.len().min(PAGE_LIMIT);
        let mut page_tasks: Vec<(String, BoxFuture<String>)> = Vec::new();
        for page in 0..total_pages {
            let service = Arc::clone(&self.service);
            let image = pages[page].clone();
            let context = initial_scan.clone();
            page_tasks.push((
                "scan_page".to_string(),
                Box::pin(async move { scan_page(&service, page, image, context).await }),
            ));
        }
        let mut gathered = service.ctx.executor.run_tasks(page_tasks).join().await?;
        let mut assembled = String::new();
        for result in gathered.take("scan_page") {
            assembled.push_str(&result?);
        }

        // The initial scan becomes the base context for every chunk; the
        // long-form fields stay out of it.
        let mut context: HashMap<String, Value> = HashMap::new();
        if let Some(object) = initial_scan.as_object() {
            for (key, value) in object {
                if key == "summary_initial" || key == "toc" {
                    continue;
                }
                context.insert(key.clone(), value.clone());
            }
        }

        let meta_id = uuid::Uuid::new_v4().to_string();
        let file_path = node.file_path();
        let source_id = node.source_id();

        let mut engrams: Vec<Engram> = Vec::new();
        for (chunk, chunk_context) in split_chunks(&assembled, &context) {
            let mut engram = Engram::new(
                vec![file_path.clone()],
                vec![source_id.clone()],
                chunk,
                true,
            );
            engram.context = chunk_context;
            engram.meta_ids = vec![meta_id.clone()];
            engrams.push(engram);
        }
        debug!("document {} produced {} engrams", node.file_name, engrams.len());

        let summary = self.full_summary(&initial_scan, &assembled).await?;
        let keywords: Vec<String> = summary
            .get("keywords")
            .and_then(|v| v.as_str())
            .map(|s| s.split(',').map(|k| k.trim().to_string()).collect())
            .unwrap_or_default();
        let summary_full = summary
            .get("summary_full")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let mut meta = Meta::new(MetaType::Document, Index::new(summary_full));
        meta.id = meta_id;
        meta.locations = vec![file_path];
        meta.source_ids = vec![source_id];
        meta.keywords = keywords;
        meta.summary_initial = initial_scan
            .get("summary_initial")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        meta.parent_id = Some(node.id.clone());

        let observation = Observation::new(Some(node.id.clone()), meta, engrams);

        service.ctx.publish(
            Topic::ObservationCreated,
            serde_json::to_value(NodeCreatedMsg {
                id: observation.id.clone(),
                parent_id: Some(node.id.clone()),
                tracking_id: Some(node.tracking_id.clone()),
                doc_id: None,
            })?,
        );
        service.ctx.publish(
            Topic::EngramsCreated,
            serde_json::to_value(EngramsCreatedMsg {
                parent_id: observation.id.clone(),
                engram_id_array: observation
                    .engram_list
                    .iter()
                    .map(|e| e.id.clone())
                    .collect(),
                count: observation.engram_list.len(),
            })?,
        );
        service.ctx.publish(
            Topic::ObservationComplete,
            serde_json::to_value(ObservationCompleteMsg {
                observation,
                tracking_id: node.tracking_id.clone(),
                repo_id: node.repo_id.clone(),
            })?,
        );
        Ok(())
    }

    /// Structured first look at the document, taken from its opening pages.
    async fn initial_scan(&self, pages: &[String]) -> Result<Value> {
        let plugin = &self.service.initial_summary_llm;
        let summary_pages = &pages[..pages.len().min(SHORT_SUMMARY_PAGE_COUNT)];

        let request = LlmRequest::new("initial_scan", prompts::render_initial_scan(&self.node))
            .with_images(summary_pages.to_vec())
            .with_schema(json!({
                "file_path": "string",
                "file_name": "string",
                "subject": "string",
                "audience": "string",
                "document_title": "string",
                "format": "string",
                "type": "string",
                "toc": "string",
                "summary_initial": "string",
                "author": "string",
                "date": "string",
                "version": "string"
            }));

        let response = plugin.instance.submit(&request, &plugin.args).await?;
        serde_json::from_str(&response.text).map_err(|err| {
            EngramError::Backend(format!("initial scan is not valid JSON: {err}"))
        })
    }

    async fn full_summary(&self, initial_scan: &Value, full_text: &str) -> Result<Value> {
        let plugin = &self.service.full_summary_llm;
        let request = LlmRequest::new(
            "full_summary",
            prompts::render_full_summary(initial_scan, full_text),
        )
        .with_schema(json!({ "summary_full": "string", "keywords": "string" }));

        let response = plugin.instance.submit(&request, &plugin.args).await?;
        serde_json::from_str(&response.text).map_err(|err| {
            EngramError::Backend(format!("full summary is not valid JSON: {err}"))
        })
    }
}

async fn scan_page(
    service: &Arc<SenseInner>,
    page: usize,
    image: String,
    initial_scan: Value,
) -> Result<String> {
    let plugin = &service.scan_page_llm;
    let request = LlmRequest::new("scan_page", prompts::render_scan_page(&initial_scan, page))
        .with_images(vec![image])
        .with_index(page);

    let response = plugin.instance.submit(&request, &plugin.args).await?;
    Ok(response.text)
}

/// Split annotated text into engram-sized chunks.
///
/// Oversized text splits at the next tag level down (section, then h1, then
/// h3); the enclosing tag's text joins the context so each leaf chunk stays
/// grounded in its headings.
pub fn split_chunks(
    text: &str,
    context: &HashMap<String, Value>,
) -> Vec<(String, HashMap<String, Value>)> {
    let mut out = Vec::new();
    split_recursive(text, context, 0, &mut out);
    out
}

fn split_recursive(
    text: &str,
    context: &HashMap<String, Value>,
    depth: usize,
    out: &mut Vec<(String, HashMap<String, Value>)>,
) {
    if text.len() <= MAX_CHUNK_SIZE || depth >= SPLIT_TAGS.len() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.push((trimmed.to_string(), context.clone()));
        }
        return;
    }

    let tag = SPLIT_TAGS[depth];
    for part in split_on_tag(text, tag) {
        let mut part_context = context.clone();
        if let Some(heading) = extract_tag_text(part, tag) {
            part_context.insert(tag.to_string(), Value::String(heading));
        }
        split_recursive(part, &part_context, depth + 1, out);
    }
}

/// Split before every opening `<tag`, keeping the delimiter with the part
/// that follows it.
fn split_on_tag<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}");
    let mut boundaries: Vec<usize> = text
        .match_indices(&open)
        .map(|(position, _)| position)
        .collect();
    if boundaries.is_empty() || boundaries[0] != 0 {
        boundaries.insert(0, 0);
    }

    let mut parts = Vec::with_capacity(boundaries.len());
    for (i, start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(text.len());
        if *start < end {
            parts.push(&text[*start..end]);
        }
    }
    parts
}

/// The inner text of the first `<tag ...>...</tag>` pair, if present.
fn extract_tag_text(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let open_at = text.find(&open)?;
    let content_at = open_at + text[open_at..].find('>')? + 1;
    let close_at = content_at + text[content_at..].find(&close)?;
    Some(text[content_at..close_at].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_chunks("<p>small</p>", &HashMap::new());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, "<p>small</p>");
    }

    #[test]
    fn long_text_splits_on_sections_with_context() {
        let section = |title: &str| {
            format!(
                "<section>{title}</section><p>{}</p>",
                "x".repeat(MAX_CHUNK_SIZE / 2)
            )
        };
        let text = format!("{}{}", section("First"), section("Second"));

        let chunks = split_chunks(&text, &HashMap::new());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].1["section"], Value::String("First".to_string()));
        assert_eq!(chunks[1].1["section"], Value::String("Second".to_string()));
    }

    #[test]
    fn nested_headings_accumulate_in_context() {
        let heading = |n: usize| {
            format!(
                "<h1>Heading {n}</h1><p>{}</p>",
                "y".repeat(MAX_CHUNK_SIZE / 2)
            )
        };
        let text = format!(
            "<section>Root</section>{}{}{}",
            heading(1),
            heading(2),
            heading(3)
        );

        let chunks = split_chunks(&text, &HashMap::new());
        assert!(chunks.len() >= 3);
        for chunk in &chunks[1..] {
            assert_eq!(chunk.1["section"], Value::String("Root".to_string()));
            assert!(chunk.1.contains_key("h1"));
        }
    }

    #[test]
    fn extract_tag_text_handles_attributes() {
        let text = "<h1 class=\"x\">Title</h1><p>body</p>";
        assert_eq!(extract_tag_text(text, "h1").unwrap(), "Title");
    }
}
