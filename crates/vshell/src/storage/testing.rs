//! Instrumented provider for tests that need to observe or break a backend.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{
    CleanupStats, MemoryStorageProvider, NodeInfo, StorageError, StorageProvider, StorageResult,
    StorageStats,
};

/// Memory provider that counts stats scans and can be told to fail writes.
#[derive(Debug, Default)]
pub(crate) struct InstrumentedProvider {
    inner: MemoryStorageProvider,
    stats_calls: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InstrumentedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of `get_storage_stats` calls so far.
    pub(crate) fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent `write_file` return a backend error.
    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StorageProvider for InstrumentedProvider {
    fn name(&self) -> &str {
        "instrumented"
    }

    fn initialize(&self) -> StorageResult<bool> {
        self.inner.initialize()
    }

    fn get_node_info(&self, path: &str) -> StorageResult<Option<NodeInfo>> {
        self.inner.get_node_info(path)
    }

    fn create_node(&self, node: &NodeInfo) -> StorageResult<bool> {
        self.inner.create_node(node)
    }

    fn list_directory(&self, path: &str) -> StorageResult<Vec<String>> {
        self.inner.list_directory(path)
    }

    fn write_file(&self, path: &str, content: &str) -> StorageResult<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("disk unplugged".to_string()));
        }
        self.inner.write_file(path, content)
    }

    fn read_file(&self, path: &str) -> StorageResult<Option<String>> {
        self.inner.read_file(path)
    }

    fn delete_node(&self, path: &str) -> StorageResult<bool> {
        self.inner.delete_node(path)
    }

    fn touch(&self, path: &str) -> StorageResult<bool> {
        self.inner.touch(path)
    }

    fn get_storage_stats(&self) -> StorageResult<StorageStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_storage_stats()
    }

    fn cleanup(&self) -> StorageResult<CleanupStats> {
        self.inner.cleanup()
    }
}
