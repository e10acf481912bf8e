use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootDirectory {
    /// Bundled resources shipped with the application.
    Resource,
    /// Files discovered under a repository on disk.
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Folder,
}

/// A file or folder known to the repo scanner. The id is a digest of the
/// path and node type, so re-scanning the same tree always yields the same
/// ids and folders never collide with files of the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    pub id: String,
    pub root_directory: RootDirectory,

    #[serde(default)]
    pub file_dirs: Vec<String>,

    pub file_name: String,
    pub node_type: NodeType,

    #[serde(default)]
    pub repo_id: Option<String>,

    pub tracking_id: String,

    #[serde(default)]
    pub percent_complete: f32,

    #[serde(default)]
    pub is_scanned: bool,
}

impl FileNode {
    pub fn new(
        root_directory: RootDirectory,
        file_dirs: Vec<String>,
        file_name: impl Into<String>,
        node_type: NodeType,
        repo_id: Option<String>,
    ) -> Self {
        let file_name = file_name.into();
        let id = Self::node_id(&file_dirs, &file_name, node_type);
        Self {
            id,
            root_directory,
            file_dirs,
            file_name,
            node_type,
            repo_id,
            tracking_id: uuid::Uuid::new_v4().to_string(),
            percent_complete: 0.0,
            is_scanned: false,
        }
    }

    /// md5 over path and node type.
    pub fn node_id(file_dirs: &[String], file_name: &str, node_type: NodeType) -> String {
        let mut path = file_dirs.join("/");
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(file_name);

        let kind = match node_type {
            NodeType::File => "file",
            NodeType::Folder => "folder",
        };
        format!("{:x}", md5::compute(format!("{path}:{kind}")))
    }

    pub fn file_path(&self) -> String {
        if self.file_dirs.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.file_dirs.join("/"), self.file_name)
        }
    }

    /// Content-hash identifier used as the engram source id for this file.
    pub fn source_id(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_across_rescans() {
        let a = FileNode::new(
            RootDirectory::Data,
            vec!["repo".to_string(), "docs".to_string()],
            "intro.pdf",
            NodeType::File,
            Some("repo-1".to_string()),
        );
        let b = FileNode::new(
            RootDirectory::Data,
            vec!["repo".to_string(), "docs".to_string()],
            "intro.pdf",
            NodeType::File,
            Some("repo-1".to_string()),
        );
        assert_eq!(a.id, b.id);
        assert_ne!(a.tracking_id, b.tracking_id);
    }

    #[test]
    fn folder_and_file_with_same_path_differ() {
        let file = FileNode::node_id(&["a".to_string()], "x", NodeType::File);
        let folder = FileNode::node_id(&["a".to_string()], "x", NodeType::Folder);
        assert_ne!(file, folder);
    }
}
