//! Progress tracker: a tree of create/complete events that bubbles
//! completion upward and reports percent-complete per tracking id.
//!
//! Nodes never hold parent pointers; edges live in a separate child -> parent
//! lookup and every traversal is an iterative walk with a visited-set guard.
//! All handlers run on the bus worker, so the state sits behind one
//! uncontended mutex.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::event::Topic;
use crate::messages::{EngramsCreatedMsg, IndicesMsg, InsertedMsg, NodeCreatedMsg, ProgressUpdatedMsg};
use crate::service::{Service, ServiceContext};
use crate::{EngramError, Result};

const NAME: &str = "progress-service";

/// Reported percentage for a root that just appeared, before any index
/// lands.
const STARTED_PERCENT: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Lesson,
    Prompt,
    Document,
    Observation,
    Engram,
}

impl ItemType {
    fn as_str(&self) -> &'static str {
        match self {
            ItemType::Lesson => "lesson",
            ItemType::Prompt => "prompt",
            ItemType::Document => "document",
            ItemType::Observation => "observation",
            ItemType::Engram => "engram",
        }
    }
}

#[derive(Debug)]
pub struct ProgressNode {
    pub item_type: ItemType,
    pub tracking_id: Option<String>,
    /// child id -> completed. A node is complete when every value is true.
    pub children_is_complete: HashMap<String, bool>,
    pub target_id: Option<String>,
}

impl ProgressNode {
    fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            tracking_id: None,
            children_is_complete: HashMap::new(),
            target_id: None,
        }
    }
}

#[derive(Debug, Default)]
struct BubbleReturn {
    total_indices: usize,
    completed_indices: usize,
    is_complete: bool,
    root_node: String,
    target_id: Option<String>,
}

type Outgoing = Vec<(Topic, Value)>;

#[derive(Default)]
pub struct ProgressState {
    progress_array: HashMap<String, ProgressNode>,
    lookup_array: HashMap<String, String>,
    tracking_array: HashMap<String, BubbleReturn>,
}

impl ProgressState {
    pub fn node_count(&self) -> usize {
        self.progress_array.len()
    }

    pub fn tracking_count(&self) -> usize {
        self.tracking_array.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.progress_array.contains_key(id)
    }

    fn on_created(
        &mut self,
        item_type: ItemType,
        msg: &NodeCreatedMsg,
        target_id: Option<String>,
    ) -> Result<Outgoing> {
        self.progress_array
            .entry(msg.id.clone())
            .or_insert_with(|| ProgressNode::new(item_type));

        if let Some(parent_id) = &msg.parent_id {
            let parent = self.progress_array.get_mut(parent_id).ok_or_else(|| {
                EngramError::Invariant(format!("parent {parent_id} missing from progress tree"))
            })?;
            parent
                .children_is_complete
                .insert(msg.id.clone(), false);
            parent.tracking_id = msg.tracking_id.clone();
            if item_type == ItemType::Document {
                parent.target_id = target_id.clone();
            }
            self.lookup_array
                .insert(msg.id.clone(), parent_id.clone());
            return Ok(Vec::new());
        }

        // An originating node: announce that work started.
        let node = self.progress_array.get_mut(&msg.id).ok_or_else(|| {
            EngramError::Invariant(format!("{} missing from progress tree", msg.id))
        })?;
        node.tracking_id = msg.tracking_id.clone();
        node.target_id = target_id.clone();

        let Some(tracking_id) = &msg.tracking_id else {
            return Ok(Vec::new());
        };
        Ok(vec![(
            Topic::ProgressUpdated,
            serde_json::to_value(ProgressUpdatedMsg {
                progress_type: item_type.as_str().to_string(),
                id: msg.id.clone(),
                target_id,
                percent_complete: STARTED_PERCENT,
                tracking_id: tracking_id.clone(),
                failed_message: None,
            })?,
        )])
    }

    fn on_engrams_created(&mut self, msg: &EngramsCreatedMsg) -> Result<()> {
        for engram_id in &msg.engram_id_array {
            self.progress_array
                .entry(engram_id.clone())
                .or_insert_with(|| ProgressNode::new(ItemType::Engram));
            let parent = self.progress_array.get_mut(&msg.parent_id).ok_or_else(|| {
                EngramError::Invariant(format!(
                    "parent {} missing from progress tree",
                    msg.parent_id
                ))
            })?;
            parent
                .children_is_complete
                .insert(engram_id.clone(), false);
            self.lookup_array
                .insert(engram_id.clone(), msg.parent_id.clone());
        }
        Ok(())
    }

    fn on_indices_created(&mut self, msg: &IndicesMsg) -> Result<()> {
        let parent = self.progress_array.get_mut(&msg.parent_id).ok_or_else(|| {
            EngramError::Invariant(format!(
                "engram {} missing from progress tree",
                msg.parent_id
            ))
        })?;
        for index_id in &msg.index_id_array {
            parent
                .children_is_complete
                .insert(index_id.clone(), false);
        }
        for index_id in &msg.index_id_array {
            self.lookup_array
                .insert(index_id.clone(), msg.parent_id.clone());
        }

        if !self.tracking_array.contains_key(&msg.tracking_id) {
            let root_node = self.find_root(&msg.parent_id)?;
            self.tracking_array.insert(
                msg.tracking_id.clone(),
                BubbleReturn {
                    root_node,
                    ..Default::default()
                },
            );
        }
        if let Some(bubble) = self.tracking_array.get_mut(&msg.tracking_id) {
            bubble.total_indices += msg.index_id_array.len();
        }
        Ok(())
    }

    fn on_indices_inserted(&mut self, msg: &IndicesMsg) -> Result<Outgoing> {
        let parent = self.progress_array.get_mut(&msg.parent_id).ok_or_else(|| {
            EngramError::Invariant(format!(
                "engram {} missing from progress tree",
                msg.parent_id
            ))
        })?;
        for index_id in &msg.index_id_array {
            parent.children_is_complete.insert(index_id.clone(), true);
        }

        let mut bubble = self.tracking_array.remove(&msg.tracking_id).ok_or_else(|| {
            EngramError::Invariant(format!(
                "tracking id {} missing from progress tracking",
                msg.tracking_id
            ))
        })?;

        let mut out = self.bubble_up_if_complete(&msg.parent_id, &mut bubble)?;

        let root = self.progress_array.get(&bubble.root_node).ok_or_else(|| {
            EngramError::Invariant(format!(
                "root {} missing from progress tree",
                bubble.root_node
            ))
        })?;
        let percent_complete = if bubble.total_indices == 0 {
            0.0
        } else {
            bubble.completed_indices as f32 / bubble.total_indices as f32
        };
        out.push((
            Topic::ProgressUpdated,
            serde_json::to_value(ProgressUpdatedMsg {
                progress_type: root.item_type.as_str().to_string(),
                id: bubble.root_node.clone(),
                target_id: root.target_id.clone(),
                percent_complete,
                tracking_id: msg.tracking_id.clone(),
                failed_message: None,
            })?,
        ));

        // The whole tree under this root is finished; forget it.
        if bubble.is_complete {
            self.cleanup_subtree(&bubble.root_node);
        } else {
            self.tracking_array.insert(msg.tracking_id.clone(), bubble);
        }
        Ok(out)
    }

    /// Walk upward from `start`, marking each node complete in its parent
    /// once all of its own children are complete. Stops at the first node
    /// with unfinished children or at the root.
    fn bubble_up_if_complete(
        &mut self,
        start: &str,
        bubble: &mut BubbleReturn,
    ) -> Result<Outgoing> {
        let mut out = Vec::new();
        let mut node_id = start.to_string();
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            if !visited.insert(node_id.clone()) {
                return Err(EngramError::Invariant(format!(
                    "cycle in progress tree at {node_id}"
                )));
            }

            let (item_type, all_complete, completed_children, has_children, target_id) = {
                let node = self.progress_array.get(&node_id).ok_or_else(|| {
                    EngramError::Invariant(format!("{node_id} missing from progress tree"))
                })?;
                (
                    node.item_type,
                    node.children_is_complete.values().all(|done| *done),
                    node.children_is_complete
                        .values()
                        .filter(|done| **done)
                        .count(),
                    !node.children_is_complete.is_empty(),
                    node.target_id.clone(),
                )
            };

            if item_type == ItemType::Engram {
                bubble.completed_indices += completed_children;
            }
            if !has_children || !all_complete {
                return Ok(out);
            }

            match item_type {
                ItemType::Document => out.push((
                    Topic::DocumentInserted,
                    serde_json::to_value(InsertedMsg {
                        id: node_id.clone(),
                    })?,
                )),
                ItemType::Lesson => out.push((
                    Topic::LessonCompleted,
                    serde_json::to_value(InsertedMsg {
                        id: node_id.clone(),
                    })?,
                )),
                ItemType::Prompt => out.push((
                    Topic::PromptInserted,
                    serde_json::to_value(InsertedMsg {
                        id: node_id.clone(),
                    })?,
                )),
                _ => {}
            }

            match self.lookup_array.get(&node_id).cloned() {
                Some(parent_id) => {
                    let parent = self.progress_array.get_mut(&parent_id).ok_or_else(|| {
                        EngramError::Invariant(format!(
                            "parent {parent_id} missing from progress tree"
                        ))
                    })?;
                    parent
                        .children_is_complete
                        .insert(node_id.clone(), true);
                    node_id = parent_id;
                }
                None => {
                    bubble.is_complete = true;
                    bubble.target_id = target_id;
                    return Ok(out);
                }
            }
        }
    }

    fn find_root(&self, start: &str) -> Result<String> {
        let mut node_id = start.to_string();
        let mut visited: HashSet<String> = HashSet::new();
        while let Some(parent_id) = self.lookup_array.get(&node_id) {
            if !visited.insert(node_id.clone()) {
                return Err(EngramError::Invariant(format!(
                    "cycle in progress tree at {node_id}"
                )));
            }
            node_id = parent_id.clone();
        }
        Ok(node_id)
    }

    fn cleanup_subtree(&mut self, root: &str) {
        let mut stack = vec![root.to_string()];
        while let Some(node_id) = stack.pop() {
            if let Some(node) = self.progress_array.remove(&node_id) {
                stack.extend(node.children_is_complete.into_keys());
            }
            self.lookup_array.remove(&node_id);
        }
    }
}

pub struct ProgressService {
    inner: Option<Arc<ProgressInner>>,
}

impl Default for ProgressService {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressService {
    pub fn new() -> Self {
        Self { inner: None }
    }
}

struct ProgressInner {
    ctx: Arc<ServiceContext>,
    state: Mutex<ProgressState>,
}

impl ProgressInner {
    fn with_state<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ProgressState) -> Result<Outgoing>,
    {
        let out = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut state)?
        };
        for (topic, payload) in out {
            self.ctx.publish(topic, payload);
        }
        Ok(())
    }
}

impl Service for ProgressService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        self.inner = Some(Arc::new(ProgressInner {
            ctx: Arc::clone(ctx),
            state: Mutex::new(ProgressState::default()),
        }));
        Ok(())
    }

    fn start(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let inner = self
            .inner
            .clone()
            .ok_or_else(|| EngramError::Invariant("progress service not initialized".to_string()))?;

        let subscribe_created = |topic: Topic, item_type: ItemType| {
            let inner = Arc::clone(&inner);
            ctx.bus.subscribe(topic, NAME, move |payload| {
                let msg: NodeCreatedMsg = serde_json::from_value(payload)?;
                inner.with_state(|state| {
                    let target_id = match item_type {
                        ItemType::Lesson => msg.doc_id.clone(),
                        ItemType::Prompt | ItemType::Document => Some(msg.id.clone()),
                        _ => None,
                    };
                    state.on_created(item_type, &msg, target_id)
                })
            });
        };
        subscribe_created(Topic::LessonCreated, ItemType::Lesson);
        subscribe_created(Topic::PromptCreated, ItemType::Prompt);
        subscribe_created(Topic::DocumentCreated, ItemType::Document);
        subscribe_created(Topic::ObservationCreated, ItemType::Observation);

        {
            let inner = Arc::clone(&inner);
            ctx.bus
                .subscribe(Topic::EngramsCreated, NAME, move |payload| {
                    let msg: EngramsCreatedMsg = serde_json::from_value(payload)?;
                    inner.with_state(|state| {
                        state.on_engrams_created(&msg)?;
                        Ok(Vec::new())
                    })
                });
        }
        {
            let inner = Arc::clone(&inner);
            ctx.bus
                .subscribe(Topic::IndicesCreated, NAME, move |payload| {
                    let msg: IndicesMsg = serde_json::from_value(payload)?;
                    inner.with_state(|state| {
                        state.on_indices_created(&msg)?;
                        Ok(Vec::new())
                    })
                });
        }
        {
            let inner = Arc::clone(&inner);
            ctx.bus
                .subscribe(Topic::IndicesInserted, NAME, move |payload| {
                    let msg: IndicesMsg = serde_json::from_value(payload)?;
                    inner.with_state(|state| state.on_indices_inserted(&msg))
                });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(id: &str, parent: Option<&str>, tracking: &str) -> NodeCreatedMsg {
        NodeCreatedMsg {
            id: id.to_string(),
            parent_id: parent.map(|p| p.to_string()),
            tracking_id: Some(tracking.to_string()),
            doc_id: None,
        }
    }

    fn indices(parent: &str, ids: &[&str], tracking: &str) -> IndicesMsg {
        IndicesMsg {
            parent_id: parent.to_string(),
            index_id_array: ids.iter().map(|s| s.to_string()).collect(),
            tracking_id: tracking.to_string(),
        }
    }

    /// document -> observation -> engram -> indices
    fn build_document_tree(state: &mut ProgressState) {
        state
            .on_created(
                ItemType::Document,
                &created("doc", None, "track"),
                Some("doc".to_string()),
            )
            .unwrap();
        state
            .on_created(ItemType::Observation, &created("obs", Some("doc"), "track"), None)
            .unwrap();
        state
            .on_engrams_created(&EngramsCreatedMsg {
                parent_id: "obs".to_string(),
                engram_id_array: vec!["eng1".to_string(), "eng2".to_string()],
                count: 2,
            })
            .unwrap();
        state
            .on_indices_created(&indices("eng1", &["i1", "i2"], "track"))
            .unwrap();
        state
            .on_indices_created(&indices("eng2", &["i3"], "track"))
            .unwrap();
    }

    #[test]
    fn partial_insertion_reports_partial_percent() {
        let mut state = ProgressState::default();
        build_document_tree(&mut state);

        let out = state
            .on_indices_inserted(&indices("eng1", &["i1", "i2"], "track"))
            .unwrap();

        let progress: ProgressUpdatedMsg = out
            .iter()
            .find(|(topic, _)| *topic == Topic::ProgressUpdated)
            .map(|(_, payload)| serde_json::from_value(payload.clone()).unwrap())
            .unwrap();
        assert!((progress.percent_complete - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(progress.progress_type, "document");
        assert_eq!(progress.id, "doc");

        // Nothing announced the document as inserted yet.
        assert!(!out.iter().any(|(topic, _)| *topic == Topic::DocumentInserted));
        assert!(state.contains("doc"));
    }

    #[test]
    fn full_insertion_bubbles_to_document_and_cleans_up() {
        let mut state = ProgressState::default();
        build_document_tree(&mut state);

        state
            .on_indices_inserted(&indices("eng1", &["i1", "i2"], "track"))
            .unwrap();
        let out = state
            .on_indices_inserted(&indices("eng2", &["i3"], "track"))
            .unwrap();

        assert!(out.iter().any(|(topic, _)| *topic == Topic::DocumentInserted));
        let progress: ProgressUpdatedMsg = out
            .iter()
            .find(|(topic, _)| *topic == Topic::ProgressUpdated)
            .map(|(_, payload)| serde_json::from_value(payload.clone()).unwrap())
            .unwrap();
        assert!((progress.percent_complete - 1.0).abs() < 1e-6);

        // The whole subtree and its tracking entry are gone.
        assert_eq!(state.node_count(), 0);
        assert_eq!(state.tracking_count(), 0);
    }

    #[test]
    fn prompt_roots_announce_prompt_inserted() {
        let mut state = ProgressState::default();
        state
            .on_created(
                ItemType::Prompt,
                &created("prompt", None, "track"),
                Some("prompt".to_string()),
            )
            .unwrap();
        state
            .on_created(
                ItemType::Observation,
                &created("obs", Some("prompt"), "track"),
                None,
            )
            .unwrap();
        state
            .on_engrams_created(&EngramsCreatedMsg {
                parent_id: "obs".to_string(),
                engram_id_array: vec!["eng".to_string()],
                count: 1,
            })
            .unwrap();
        state
            .on_indices_created(&indices("eng", &["i1"], "track"))
            .unwrap();

        let out = state
            .on_indices_inserted(&indices("eng", &["i1"], "track"))
            .unwrap();
        assert!(out.iter().any(|(topic, _)| *topic == Topic::PromptInserted));
        assert_eq!(state.node_count(), 0);
    }

    #[test]
    fn missing_node_is_an_invariant_error() {
        let mut state = ProgressState::default();
        let err = state
            .on_indices_inserted(&indices("ghost", &["i1"], "track"))
            .unwrap_err();
        assert!(matches!(err, EngramError::Invariant(_)));
    }

    #[test]
    fn root_creation_announces_started_percent() {
        let mut state = ProgressState::default();
        let out = state
            .on_created(
                ItemType::Document,
                &created("doc", None, "track"),
                Some("doc".to_string()),
            )
            .unwrap();
        let progress: ProgressUpdatedMsg =
            serde_json::from_value(out[0].1.clone()).unwrap();
        assert!((progress.percent_complete - STARTED_PERCENT).abs() < 1e-6);
    }
}
