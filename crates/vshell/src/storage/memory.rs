//! In-memory storage provider.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{
    CleanupStats, NodeInfo, StorageError, StorageProvider, StorageResult, StorageStats, TEMP_DIR,
    now_millis,
};
use crate::path;

#[derive(Debug, Clone)]
struct MemoryNode {
    info: NodeInfo,
    content: String,
    children: BTreeMap<String, MemoryNode>,
}

impl MemoryNode {
    fn new(info: NodeInfo) -> Self {
        Self {
            info,
            content: String::new(),
            children: BTreeMap::new(),
        }
    }

    fn find(&self, path: &str) -> Option<&MemoryNode> {
        let mut node = self;
        for part in path::segments(path) {
            node = node.children.get(part)?;
        }
        Some(node)
    }

    fn find_mut(&mut self, path: &str) -> Option<&mut MemoryNode> {
        let mut node = self;
        for part in path::segments(path) {
            node = node.children.get_mut(part)?;
        }
        Some(node)
    }

    fn tally(&self, stats: &mut StorageStats) {
        if self.info.is_dir {
            stats.directory_count += 1;
        } else {
            stats.file_count += 1;
            stats.total_size_bytes += self.content.len() as u64;
        }
        for child in self.children.values() {
            child.tally(stats);
        }
    }

    fn tally_files(&self, stats: &mut CleanupStats) {
        for child in self.children.values() {
            if child.info.is_dir {
                child.tally_files(stats);
            } else {
                stats.files_removed += 1;
                stats.bytes_freed += child.content.len() as u64;
            }
        }
    }
}

/// Storage provider holding the whole tree in process memory.
///
/// The tree is nested maps of child name to node, guarded by a single
/// `RwLock` so every mutation is atomic with respect to other callers.
#[derive(Debug, Default)]
pub struct MemoryStorageProvider {
    root: RwLock<Option<MemoryNode>>,
}

impl MemoryStorageProvider {
    /// Create an uninitialized provider. Call
    /// [`initialize`](StorageProvider::initialize) before use.
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryNode) -> T) -> StorageResult<Option<T>> {
        let guard = self.root.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(guard.as_ref().map(f))
    }

    fn write<T>(&self, f: impl FnOnce(&mut MemoryNode) -> T) -> StorageResult<Option<T>> {
        let mut guard = self.root.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(guard.as_mut().map(f))
    }
}

impl StorageProvider for MemoryStorageProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn initialize(&self) -> StorageResult<bool> {
        let mut guard = self.root.write().map_err(|_| StorageError::LockPoisoned)?;
        if guard.is_none() {
            *guard = Some(MemoryNode::new(NodeInfo::root()));
        }
        Ok(true)
    }

    fn get_node_info(&self, path: &str) -> StorageResult<Option<NodeInfo>> {
        let path = path::normalize(path);
        Ok(self
            .read(|root| root.find(&path).map(|n| n.info.clone()))?
            .flatten())
    }

    fn create_node(&self, node: &NodeInfo) -> StorageResult<bool> {
        if node.name.is_empty() || node.name.contains('/') || node.name == "." || node.name == ".." {
            return Ok(false);
        }
        let parent_path = path::normalize(&node.parent_path);
        let created = self.write(|root| {
            let Some(parent) = root.find_mut(&parent_path) else {
                return false;
            };
            if !parent.info.is_dir || parent.children.contains_key(&node.name) {
                return false;
            }
            let mut info = node.clone();
            info.parent_path = parent_path.clone();
            if !info.is_dir {
                info.size = Some(0);
            }
            parent
                .children
                .insert(node.name.clone(), MemoryNode::new(info));
            true
        })?;
        let created = created.unwrap_or(false);
        if created {
            tracing::debug!(path = %node.get_path(), is_dir = node.is_dir, "memory: created node");
        }
        Ok(created)
    }

    fn list_directory(&self, path: &str) -> StorageResult<Vec<String>> {
        let path = path::normalize(path);
        Ok(self
            .read(|root| match root.find(&path) {
                Some(node) if node.info.is_dir => node.children.keys().cloned().collect(),
                _ => Vec::new(),
            })?
            .unwrap_or_default())
    }

    fn write_file(&self, path: &str, content: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        let written = self.write(|root| match root.find_mut(&path) {
            Some(node) if !node.info.is_dir => {
                node.content = content.to_string();
                node.info.size = Some(content.len() as u64);
                node.info.modified_at = now_millis();
                true
            }
            _ => false,
        })?;
        Ok(written.unwrap_or(false))
    }

    fn read_file(&self, path: &str) -> StorageResult<Option<String>> {
        let path = path::normalize(path);
        Ok(self
            .read(|root| match root.find(&path) {
                Some(node) if !node.info.is_dir => Some(node.content.clone()),
                _ => None,
            })?
            .flatten())
    }

    fn delete_node(&self, path: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        let (parent_path, name) = path::split(&path);
        if name.is_empty() {
            return Ok(false);
        }
        let deleted = self.write(|root| {
            let Some(parent) = root.find_mut(&parent_path) else {
                return false;
            };
            let removable = parent
                .children
                .get(&name)
                .is_some_and(|child| !child.info.is_dir || child.children.is_empty());
            removable && parent.children.remove(&name).is_some()
        })?;
        Ok(deleted.unwrap_or(false))
    }

    fn touch(&self, path: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        let touched = self.write(|root| match root.find_mut(&path) {
            Some(node) => {
                node.info.modified_at = now_millis();
                true
            }
            None => false,
        })?;
        Ok(touched.unwrap_or(false))
    }

    fn get_storage_stats(&self) -> StorageResult<StorageStats> {
        let mut stats = StorageStats {
            provider: self.name().to_string(),
            ..StorageStats::default()
        };
        self.read(|root| root.tally(&mut stats))?;
        Ok(stats)
    }

    fn cleanup(&self) -> StorageResult<CleanupStats> {
        let stats = self.write(|root| {
            let mut stats = CleanupStats::default();
            if let Some(tmp) = root.find_mut(TEMP_DIR)
                && tmp.info.is_dir
            {
                tmp.tally_files(&mut stats);
                tmp.children.clear();
            }
            stats
        })?;
        let stats = stats.unwrap_or_default();
        tracing::debug!(
            files_removed = stats.files_removed,
            bytes_freed = stats.bytes_freed,
            "memory: cleanup"
        );
        Ok(stats)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn provider() -> MemoryStorageProvider {
        let provider = MemoryStorageProvider::new();
        assert!(provider.initialize().unwrap());
        provider
    }

    provider_conformance_tests!(provider());

    #[test]
    fn test_uninitialized_provider_is_empty() {
        let provider = MemoryStorageProvider::new();
        assert!(provider.get_node_info("/").unwrap().is_none());
        assert!(!provider.create_node(&NodeInfo::directory("a", "/")).unwrap());
        assert!(provider.list_directory("/").unwrap().is_empty());
    }

    #[test]
    fn test_initialize_twice_keeps_content() {
        let provider = provider();
        provider
            .create_node(&NodeInfo::directory("keep", "/"))
            .unwrap();
        assert!(provider.initialize().unwrap());
        assert!(provider.get_node_info("/keep").unwrap().is_some());
    }
}
