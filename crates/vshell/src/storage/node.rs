//! Filesystem node metadata.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::path;

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Metadata describing one filesystem entry.
///
/// The root is the only node with an empty `name` and an empty
/// `parent_path`. Every other node names its containing directory by
/// absolute path (`"/"` for top-level entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Single path component, empty for the root.
    pub name: String,
    /// Whether this node is a directory.
    pub is_dir: bool,
    /// Absolute path of the containing directory.
    #[serde(default)]
    pub parent_path: String,
    /// Creation time as Unix milliseconds.
    #[serde(default)]
    pub created_at: u64,
    /// Last modification time as Unix milliseconds.
    #[serde(default)]
    pub modified_at: u64,
    /// Content length in bytes, files only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl NodeInfo {
    /// Create node metadata stamped with the current time.
    pub fn new(name: impl Into<String>, is_dir: bool, parent_path: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            name: name.into(),
            is_dir,
            parent_path: parent_path.into(),
            created_at: now,
            modified_at: now,
            size: if is_dir { None } else { Some(0) },
        }
    }

    /// Metadata for a directory.
    pub fn directory(name: impl Into<String>, parent_path: impl Into<String>) -> Self {
        Self::new(name, true, parent_path)
    }

    /// Metadata for an empty file.
    pub fn file(name: impl Into<String>, parent_path: impl Into<String>) -> Self {
        Self::new(name, false, parent_path)
    }

    /// Metadata for the root directory.
    pub fn root() -> Self {
        Self::new("", true, "")
    }

    /// Build metadata for the node at an absolute path.
    pub fn for_path(full_path: &str, is_dir: bool) -> Self {
        let (parent, name) = path::split(full_path);
        if name.is_empty() {
            return Self::root();
        }
        Self::new(name, is_dir, parent)
    }

    /// Whether this is the root node.
    pub fn is_root(&self) -> bool {
        self.name.is_empty() && self.parent_path.is_empty()
    }

    /// Absolute path of this node.
    pub fn get_path(&self) -> String {
        if self.name.is_empty() {
            return "/".to_string();
        }
        path::join(&self.parent_path, &self.name)
    }

    /// Serialize to the JSON shape stored alongside object-storage content.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse metadata previously produced by [`NodeInfo::to_json`].
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        let root = NodeInfo::root();
        assert!(root.is_root());
        assert!(root.is_dir);
        assert_eq!(root.get_path(), "/");
    }

    #[test]
    fn test_top_level_and_nested_paths() {
        assert_eq!(NodeInfo::file("a.txt", "/").get_path(), "/a.txt");
        assert_eq!(NodeInfo::directory("b", "/a").get_path(), "/a/b");
    }

    #[test]
    fn test_for_path() {
        let node = NodeInfo::for_path("/home/user/notes.txt", false);
        assert_eq!(node.name, "notes.txt");
        assert_eq!(node.parent_path, "/home/user");
        assert_eq!(node.size, Some(0));

        assert!(NodeInfo::for_path("/", true).is_root());
    }

    #[test]
    fn test_json_round_trip() {
        let node = NodeInfo::directory("docs", "/home");
        let json = node.to_json().unwrap();
        assert!(!json.contains("size"));
        assert_eq!(NodeInfo::from_json(&json).unwrap(), node);
    }
}
