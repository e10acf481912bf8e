//! Repo scanner: discovers repositories under `REPO_ROOT`, announces their
//! file trees, and submits files for scanning on request.
//!
//! A repository is any directory carrying a `.repo` marker with a stable
//! `repository.id`. Directories without one are skipped with a warning; the
//! reserved id `null` belongs to the default repo and may not be claimed.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::event::Topic;
use crate::messages::{InsertedMsg, SubmitIdsMsg};
use crate::repository::DocumentRepository;
use crate::service::{Service, ServiceContext};
use crate::types::{FileNode, NodeType, RootDirectory, NULL_REPO};
use crate::{EngramError, Result};

const NAME: &str = "repo-service";

pub const REPO_ROOT_ENV: &str = "REPO_ROOT";
const REPO_MARKER: &str = ".repo";

pub struct RepoService {
    inner: Option<Arc<RepoInner>>,
}

impl Default for RepoService {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoService {
    pub fn new() -> Self {
        Self { inner: None }
    }
}

struct RepoInner {
    ctx: Arc<ServiceContext>,
    document_repository: Arc<DocumentRepository>,
    /// repo id -> folder name under the repo root.
    repos: Mutex<HashMap<String, String>>,
    file_index: DashMap<String, FileNode>,
    submitted: Mutex<HashSet<String>>,
}

impl Service for RepoService {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let db = ctx.plugins.get_db("document")?;
        self.inner = Some(Arc::new(RepoInner {
            ctx: Arc::clone(ctx),
            document_repository: Arc::new(DocumentRepository::new(db)),
            repos: Mutex::new(HashMap::new()),
            file_index: DashMap::new(),
            submitted: Mutex::new(HashSet::new()),
        }));
        Ok(())
    }

    fn start(&mut self, ctx: &Arc<ServiceContext>) -> Result<()> {
        let inner = self
            .inner
            .clone()
            .ok_or_else(|| EngramError::Invariant("repo service not initialized".to_string()))?;

        {
            let inner = Arc::clone(&inner);
            ctx.bus.subscribe(Topic::RepoSubmitIds, NAME, move |payload| {
                let msg: SubmitIdsMsg = serde_json::from_value(payload)?;
                inner.submit_ids(&msg.submit_ids);
                Ok(())
            });
        }
        {
            let inner = Arc::clone(&inner);
            ctx.bus
                .subscribe(Topic::DocumentInserted, NAME, move |payload| {
                    let msg: InsertedMsg = serde_json::from_value(payload)?;
                    inner.on_document_inserted(msg.id);
                    Ok(())
                });
        }

        // Discovery starts as soon as a repo root is configured.
        if std::env::var(REPO_ROOT_ENV).is_ok() {
            let inner = Arc::clone(&inner);
            ctx.executor
                .run_task(async move { inner.scan_folders().await });
        }
        Ok(())
    }
}

impl RepoInner {
    async fn scan_folders(self: Arc<Self>) -> Result<()> {
        let repo_root = std::env::var(REPO_ROOT_ENV).map_err(|_| {
            EngramError::Config(format!("environment variable '{REPO_ROOT_ENV}' is not set"))
        })?;
        let repo_root = Path::new(&repo_root);

        self.discover_repos(repo_root)?;
        let repos = self
            .repos
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        self.ctx.publish(
            Topic::RepoDirectoryScanned,
            json!({ "repo_folders": repos }),
        );

        for (repo_id, folder) in repos {
            let files = self.scan_repo(repo_root, &repo_id, &folder).await?;
            self.ctx.publish(
                Topic::RepoFileFolderTreeUpdated,
                json!({
                    "repo_id": repo_id,
                    "repo": folder,
                    "files": files,
                }),
            );
        }
        Ok(())
    }

    fn discover_repos(&self, repo_root: &Path) -> Result<()> {
        let entries = std::fs::read_dir(repo_root)?;
        let mut repos = self.repos.lock().unwrap_or_else(|e| e.into_inner());

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match load_repository_id(&path) {
                Ok(repo_id) if repo_id == NULL_REPO => {
                    warn!("skipping '{name}': repository id '{NULL_REPO}' is reserved");
                }
                Ok(repo_id) => {
                    info!("discovered repo '{name}' ({repo_id})");
                    repos.insert(repo_id, name);
                }
                Err(err) => {
                    warn!("skipping '{name}': {err}");
                }
            }
        }
        Ok(())
    }

    async fn scan_repo(
        &self,
        repo_root: &Path,
        repo_id: &str,
        folder: &str,
    ) -> Result<Vec<Value>> {
        let base = repo_root.join(folder);
        let mut files = Vec::new();

        for entry in walkdir::WalkDir::new(&base)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(repo_root)
                .unwrap_or(entry.path());
            let mut file_dirs: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            file_dirs.pop();

            let mut node = FileNode::new(
                RootDirectory::Data,
                file_dirs,
                file_name,
                NodeType::File,
                Some(repo_id.to_string()),
            );
            // A previously stored node keeps its identity, including the
            // scanned flag that prevents duplicate submissions.
            if let Some(stored) = self.document_repository.load(&node.id).await? {
                node = stored;
            }

            let doc = serde_json::to_value(&node)?;
            self.ctx.publish(Topic::RepoFileFound, doc.clone());
            files.push(doc);
            self.file_index.insert(node.id.clone(), node);
        }
        Ok(files)
    }

    fn submit_ids(self: &Arc<Self>, ids: &[String]) {
        for id in ids {
            let Some(node) = self.file_index.get(id).map(|n| n.value().clone()) else {
                warn!("submit for unknown file id {id}");
                continue;
            };
            if node.is_scanned {
                info!("{} already scanned; not submitting again", node.file_name);
                continue;
            }
            {
                let mut submitted = self.submitted.lock().unwrap_or_else(|e| e.into_inner());
                if !submitted.insert(id.clone()) {
                    continue;
                }
            }
            match serde_json::to_value(&node) {
                Ok(payload) => self.ctx.publish(Topic::SubmitDocument, payload),
                Err(err) => warn!("file node {id} failed to serialize: {err}"),
            }
        }
    }

    fn on_document_inserted(self: &Arc<Self>, document_id: String) {
        {
            let mut submitted = self.submitted.lock().unwrap_or_else(|e| e.into_inner());
            if !submitted.remove(&document_id) {
                return;
            }
        }
        let Some(mut node) = self
            .file_index
            .get(&document_id)
            .map(|n| n.value().clone())
        else {
            return;
        };
        node.is_scanned = true;
        node.percent_complete = 1.0;
        self.file_index.insert(document_id, node.clone());

        let inner = Arc::clone(self);
        self.ctx.executor.run_task(async move {
            inner.document_repository.save(&node).await
        });
    }
}

fn load_repository_id(folder: &Path) -> Result<String> {
    let marker = folder.join(REPO_MARKER);
    if !marker.is_file() {
        return Err(EngramError::Config(format!(
            "repository config file '{REPO_MARKER}' not found in '{}'",
            folder.display()
        )));
    }

    let text = std::fs::read_to_string(&marker)?;
    let table: toml::Table = text.parse().map_err(|err| {
        EngramError::Config(format!("invalid {REPO_MARKER} at '{}': {err}", marker.display()))
    })?;

    table
        .get("repository")
        .and_then(|v| v.as_table())
        .and_then(|t| t.get("id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            EngramError::Config(format!(
                "missing 'repository.id' entry in {REPO_MARKER} at '{}'",
                marker.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_id_is_read_from_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(REPO_MARKER),
            "[repository]\nid = \"repo-42\"\n",
        )
        .unwrap();
        assert_eq!(load_repository_id(dir.path()).unwrap(), "repo-42");
    }

    #[test]
    fn missing_marker_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_repository_id(dir.path()).unwrap_err();
        assert!(matches!(err, EngramError::Config(_)));
    }

    #[test]
    fn marker_without_id_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(REPO_MARKER), "[repository]\nname = \"x\"\n").unwrap();
        assert!(load_repository_id(dir.path()).is_err());
    }
}
