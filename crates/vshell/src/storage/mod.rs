//! Pluggable storage for the virtual filesystem.
//!
//! This module provides:
//! - [`NodeInfo`] - metadata for one filesystem entry
//! - [`StorageProvider`] - the backend contract every store implements
//! - [`MemoryStorageProvider`] - a tree held in process memory
//! - [`SqliteStorageProvider`] - a single `nodes` table in SQLite
//! - [`ObjectStorageProvider`] - object-store keys with JSON metadata sidecars
//! - [`ProviderRegistry`] - construction of providers by name
//!
//! All backends share the same path semantics. Expected failures (missing
//! parent, node already present, non-empty directory, wrong node type) come
//! back as `Ok(false)` / `Ok(None)`; `Err` is reserved for the backend
//! itself failing.

#[cfg(test)]
#[macro_use]
mod conformance;

mod memory;
mod node;
mod object;
mod registry;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStorageProvider;
pub use node::{NodeInfo, now_millis};
pub use object::{InMemoryObjectStore, ObjectStorageProvider, ObjectStore, ObjectSummary};
pub use registry::{ProviderArgs, ProviderConstructor, ProviderRegistry, create_provider};
pub use sqlite::SqliteStorageProvider;

use crate::path;

/// Errors raised when a storage backend itself fails.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transport or I/O failure in the backend
    #[error("storage backend error: {0}")]
    Backend(String),
    /// SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Metadata could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// No provider registered under the requested name
    #[error("unknown storage provider: {0}")]
    UnknownProvider(String),
    /// A provider argument had the wrong shape
    #[error("invalid provider argument: {0}")]
    InvalidArgument(String),
    /// A denied-path pattern failed to compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    /// An internal lock was poisoned by a panicking holder
    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Aggregate usage numbers for a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Provider name
    pub provider: String,
    /// Number of file nodes
    pub file_count: u64,
    /// Number of directory nodes, including the root
    pub directory_count: u64,
    /// Sum of file sizes in bytes
    pub total_size_bytes: u64,
    /// Backend-specific fields (quotas, locations)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Outcome of a provider cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    /// Number of files deleted
    pub files_removed: u64,
    /// Bytes reclaimed from deleted files
    pub bytes_freed: u64,
}

/// Directory whose contents [`StorageProvider::cleanup`] reclaims.
pub const TEMP_DIR: &str = "/tmp";

/// Contract implemented by every storage backend.
///
/// Paths passed in are absolute; implementations normalize them before use.
/// Implementations must be `Send + Sync` so a single provider can back the
/// interactive shell and any number of agent tasks.
pub trait StorageProvider: Send + Sync + fmt::Debug {
    /// Short backend name (e.g. `"memory"`).
    fn name(&self) -> &str;

    /// Prepare the backend and create the root node. Idempotent.
    fn initialize(&self) -> StorageResult<bool>;

    /// Metadata for the node at `path`, if present.
    fn get_node_info(&self, path: &str) -> StorageResult<Option<NodeInfo>>;

    /// Create a node. Fails if the parent is missing or not a directory, or
    /// if a node already exists at the target path.
    fn create_node(&self, node: &NodeInfo) -> StorageResult<bool>;

    /// Child names of a directory, sorted. Empty if `path` is not a directory.
    fn list_directory(&self, path: &str) -> StorageResult<Vec<String>>;

    /// Replace the content of an existing file node.
    fn write_file(&self, path: &str, content: &str) -> StorageResult<bool>;

    /// Content of a file node.
    fn read_file(&self, path: &str) -> StorageResult<Option<String>>;

    /// Delete a file or an empty directory. The root cannot be deleted.
    fn delete_node(&self, path: &str) -> StorageResult<bool>;

    /// Bump the modification time of an existing node.
    fn touch(&self, path: &str) -> StorageResult<bool>;

    /// Aggregate counts and sizes.
    fn get_storage_stats(&self) -> StorageResult<StorageStats>;

    /// Reclaim temporary data below [`TEMP_DIR`].
    fn cleanup(&self) -> StorageResult<CleanupStats>;
}

/// Check the structural preconditions of `create_node` against a provider.
///
/// Used by backends that cannot express the check inside one transaction.
pub(crate) fn can_create(provider: &dyn StorageProvider, node: &NodeInfo) -> StorageResult<bool> {
    if node.name.is_empty() || node.name.contains('/') || node.name == "." || node.name == ".." {
        return Ok(false);
    }
    let full = node.get_path();
    if provider.get_node_info(&full)?.is_some() {
        return Ok(false);
    }
    let parent = path::normalize(&node.parent_path);
    Ok(provider
        .get_node_info(&parent)?
        .is_some_and(|parent| parent.is_dir))
}

/// Every path strictly below [`TEMP_DIR`], deepest first.
///
/// Backends use this to implement cleanup by repeated deletes.
pub(crate) fn temp_descendants(provider: &dyn StorageProvider) -> StorageResult<Vec<NodeInfo>> {
    let mut found = Vec::new();
    let mut stack = vec![TEMP_DIR.to_string()];
    while let Some(dir) = stack.pop() {
        for name in provider.list_directory(&dir)? {
            let child = path::join(&dir, &name);
            if let Some(info) = provider.get_node_info(&child)? {
                if info.is_dir {
                    stack.push(child);
                }
                found.push(info);
            }
        }
    }
    found.sort_by_key(|info| std::cmp::Reverse(path::depth(&info.get_path())));
    Ok(found)
}

/// Run [`temp_descendants`]-driven cleanup through `delete_node`.
pub(crate) fn cleanup_by_delete(provider: &dyn StorageProvider) -> StorageResult<CleanupStats> {
    let mut stats = CleanupStats::default();
    for info in temp_descendants(provider)? {
        if provider.delete_node(&info.get_path())? && !info.is_dir {
            stats.files_removed += 1;
            stats.bytes_freed += info.size.unwrap_or(0);
        }
    }
    Ok(stats)
}

/// Create `dir` and any missing ancestors directly on `provider`.
///
/// Returns false if some component exists as a file.
pub(crate) fn create_dir_all(provider: &dyn StorageProvider, dir: &str) -> StorageResult<bool> {
    let mut current = "/".to_string();
    for part in path::segments(dir) {
        let next = path::join(&current, part);
        match provider.get_node_info(&next)? {
            Some(info) if info.is_dir => {}
            Some(_) => return Ok(false),
            None => {
                if !provider.create_node(&NodeInfo::directory(part, current.as_str()))? {
                    return Ok(false);
                }
            }
        }
        current = next;
    }
    Ok(true)
}
