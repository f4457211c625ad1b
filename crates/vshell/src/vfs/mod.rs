//! Virtual filesystem manager.
//!
//! This module provides:
//! - [`VirtualFileSystem`] - path resolution, a working-directory cursor and
//!   Unix-like operations composed from [`StorageProvider`] primitives
//! - [`Traversal`] - results of `find` / `search`, including skipped subtrees
//!
//! Every operation resolves its path against the cursor first. Expected
//! failures (missing parent, wrong node type, non-empty directory, policy
//! rejection) come back as `Ok(false)` / `Ok(None)`.

mod traversal;

use std::sync::Arc;

use serde::Serialize;

use crate::path;
use crate::policy::{SecurityPolicy, SecurityWrapper, Violation};
use crate::storage::{
    self, CleanupStats, MemoryStorageProvider, NodeInfo, ProviderArgs, StorageProvider,
    StorageResult, StorageStats, create_provider,
};

pub use traversal::Traversal;

/// Directories every filesystem starts with.
pub const BASE_LAYOUT: [&str; 5] = ["/bin", "/home", "/tmp", "/etc", "/var"];

/// Summary returned by [`VirtualFileSystem::fs_info`].
#[derive(Debug, Clone, Serialize)]
pub struct FsInfo {
    /// The working directory
    pub current_directory: String,
    /// Provider name, including any security wrapper
    pub provider: String,
    /// Whether a security policy is applied
    pub security_enabled: bool,
    /// Whether mutations are rejected outright
    pub read_only: bool,
    /// Provider statistics
    pub stats: StorageStats,
}

/// A Unix-like filesystem over a pluggable storage provider.
#[derive(Debug, Clone)]
pub struct VirtualFileSystem {
    provider: Arc<dyn StorageProvider>,
    security: Option<Arc<SecurityWrapper>>,
    cwd: String,
}

impl VirtualFileSystem {
    /// A filesystem held in memory.
    pub fn new() -> StorageResult<Self> {
        Self::with_provider(Arc::new(MemoryStorageProvider::new()))
    }

    /// A filesystem over a registered provider.
    pub fn from_provider_name(name: &str, args: &ProviderArgs) -> StorageResult<Self> {
        Self::with_provider(create_provider(name, args)?)
    }

    /// A filesystem over `provider`, which is initialized and given the base
    /// layout.
    pub fn with_provider(provider: Arc<dyn StorageProvider>) -> StorageResult<Self> {
        provider.initialize()?;
        for dir in BASE_LAYOUT {
            storage::create_dir_all(provider.as_ref(), dir)?;
        }
        Ok(Self {
            provider,
            security: None,
            cwd: "/".to_string(),
        })
    }

    /// A filesystem over `provider` with `policy` applied after the base
    /// layout is in place.
    pub fn with_security(
        provider: Arc<dyn StorageProvider>,
        policy: SecurityPolicy,
    ) -> StorageResult<Self> {
        let mut fs = Self::with_provider(provider)?;
        fs.apply_security(policy)?;
        Ok(fs)
    }

    /// Enforce `policy` from now on, replacing any policy already applied.
    pub fn apply_security(&mut self, policy: SecurityPolicy) -> StorageResult<()> {
        let base = self.raw_provider();
        let wrapper = Arc::new(SecurityWrapper::new(base, policy)?);
        tracing::debug!(provider = %wrapper.name(), "applied security policy");
        self.provider = Arc::clone(&wrapper) as Arc<dyn StorageProvider>;
        self.security = Some(wrapper);
        Ok(())
    }

    /// The provider operations go through.
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// The applied security wrapper, if any.
    pub fn security(&self) -> Option<&Arc<SecurityWrapper>> {
        self.security.as_ref()
    }

    /// The provider beneath any security wrapper.
    fn raw_provider(&self) -> Arc<dyn StorageProvider> {
        match &self.security {
            Some(wrapper) => wrapper.inner().clone(),
            None => self.provider.clone(),
        }
    }

    /// Name of the active provider.
    pub fn provider_name(&self) -> String {
        self.provider.name().to_string()
    }

    /// Recorded security violations, empty without a policy.
    pub fn security_violations(&self) -> Vec<Violation> {
        self.security
            .as_ref()
            .map(|w| w.violations())
            .unwrap_or_default()
    }

    /// Whether the applied policy rejects every mutation.
    pub fn is_read_only(&self) -> bool {
        self.security.as_ref().is_some_and(|w| w.is_read_only())
    }

    /// Resolve `path` against the working directory.
    pub fn resolve_path(&self, path: &str) -> String {
        path::resolve(&self.cwd, path)
    }

    /// The working directory.
    pub fn pwd(&self) -> &str {
        &self.cwd
    }

    /// Metadata for the node at `path`.
    pub fn get_node_info(&self, path: &str) -> StorageResult<Option<NodeInfo>> {
        self.provider.get_node_info(&self.resolve_path(path))
    }

    /// Whether anything exists at `path`.
    pub fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.get_node_info(path)?.is_some())
    }

    /// Whether `path` is a directory.
    pub fn is_dir(&self, path: &str) -> StorageResult<bool> {
        Ok(self.get_node_info(path)?.is_some_and(|n| n.is_dir))
    }

    /// Whether `path` is a file.
    pub fn is_file(&self, path: &str) -> StorageResult<bool> {
        Ok(self.get_node_info(path)?.is_some_and(|n| !n.is_dir))
    }

    /// Create a directory whose parent already exists.
    pub fn mkdir(&self, path: &str) -> StorageResult<bool> {
        let full = self.resolve_path(path);
        let (parent, name) = path::split(&full);
        if name.is_empty() || self.provider.get_node_info(&full)?.is_some() {
            return Ok(false);
        }
        if !self
            .provider
            .get_node_info(&parent)?
            .is_some_and(|p| p.is_dir)
        {
            return Ok(false);
        }
        self.provider.create_node(&NodeInfo::directory(name, parent))
    }

    /// Create a directory and any missing ancestors. Succeeds if the
    /// directory already exists.
    pub fn mkdir_all(&self, path: &str) -> StorageResult<bool> {
        let full = self.resolve_path(path);
        storage::create_dir_all(self.provider.as_ref(), &full)
    }

    /// Create an empty file, or bump the modification time of an existing
    /// one. Fails on directories.
    pub fn touch(&self, path: &str) -> StorageResult<bool> {
        let full = self.resolve_path(path);
        match self.provider.get_node_info(&full)? {
            Some(info) if info.is_dir => Ok(false),
            Some(_) => self.provider.touch(&full),
            None => self
                .provider
                .create_node(&NodeInfo::for_path(&full, false)),
        }
    }

    /// Replace the content of a file, creating it if absent.
    ///
    /// When the file did not exist and the write is rejected or fails, the
    /// empty node created for it is removed again.
    pub fn write_file(&self, path: &str, content: &str) -> StorageResult<bool> {
        let full = self.resolve_path(path);
        let created = match self.provider.get_node_info(&full)? {
            Some(info) if info.is_dir => return Ok(false),
            Some(_) => false,
            None => {
                if full == "/"
                    || !self
                        .provider
                        .create_node(&NodeInfo::for_path(&full, false))?
                {
                    return Ok(false);
                }
                true
            }
        };
        match self.provider.write_file(&full, content) {
            Ok(written) => {
                if !written && created {
                    self.raw_provider().delete_node(&full)?;
                }
                Ok(written)
            }
            Err(err) => {
                if created && let Err(cleanup) = self.raw_provider().delete_node(&full) {
                    tracing::warn!(
                        path = %full,
                        error = %cleanup,
                        "failed to remove placeholder after write error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Append to a file, creating it if absent.
    pub fn append_file(&self, path: &str, content: &str) -> StorageResult<bool> {
        let existing = self.read_file(path)?.unwrap_or_default();
        self.write_file(path, &format!("{}{}", existing, content))
    }

    /// Content of a file; `None` if missing or a directory.
    pub fn read_file(&self, path: &str) -> StorageResult<Option<String>> {
        self.provider.read_file(&self.resolve_path(path))
    }

    /// True if removing `full` would take the working directory with it.
    fn holds_cwd(&self, full: &str) -> bool {
        path::is_within(&self.cwd, full)
    }

    /// Remove a file or an empty directory. The root and the working
    /// directory are never removed.
    pub fn rm(&self, path: &str) -> StorageResult<bool> {
        let full = self.resolve_path(path);
        if full == "/" || self.holds_cwd(&full) {
            return Ok(false);
        }
        self.provider.delete_node(&full)
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, path: &str) -> StorageResult<bool> {
        if !self.is_dir(path)? {
            return Ok(false);
        }
        self.rm(path)
    }

    /// Remove a node and everything beneath it. Stops at the first failure.
    /// Refused when the working directory lies inside the tree.
    pub fn rm_recursive(&self, path: &str) -> StorageResult<bool> {
        let full = self.resolve_path(path);
        if full == "/" || self.holds_cwd(&full) {
            return Ok(false);
        }
        let Some(info) = self.provider.get_node_info(&full)? else {
            return Ok(false);
        };
        if info.is_dir {
            for child in self.provider.list_directory(&full)? {
                if !self.rm_recursive(&path::join(&full, &child))? {
                    return Ok(false);
                }
            }
        }
        self.provider.delete_node(&full)
    }

    /// Child names of a directory (the working directory if `path` is
    /// `None`). Empty if the target is not a directory.
    pub fn ls(&self, path: Option<&str>) -> StorageResult<Vec<String>> {
        let full = self.resolve_path(path.unwrap_or("."));
        self.provider.list_directory(&full)
    }

    /// Move the working directory. Leaves it unchanged unless `path` is an
    /// existing directory.
    pub fn cd(&mut self, path: &str) -> StorageResult<bool> {
        let full = self.resolve_path(path);
        if !self
            .provider
            .get_node_info(&full)?
            .is_some_and(|n| n.is_dir)
        {
            return Ok(false);
        }
        self.cwd = full;
        Ok(true)
    }

    /// Final destination for copying `src` to `dst`: into `dst` when it is
    /// an existing directory.
    fn destination(&self, src: &str, dst: &str) -> StorageResult<String> {
        let dst = self.resolve_path(dst);
        if self.provider.get_node_info(&dst)?.is_some_and(|n| n.is_dir) {
            Ok(path::join(&dst, &path::basename(src)))
        } else {
            Ok(dst)
        }
    }

    /// Copy a file or directory tree.
    pub fn cp(&self, src: &str, dst: &str) -> StorageResult<bool> {
        let src = self.resolve_path(src);
        let Some(info) = self.provider.get_node_info(&src)? else {
            return Ok(false);
        };
        let dst = self.destination(&src, dst)?;
        if dst == src || (info.is_dir && path::is_within(&dst, &src)) {
            return Ok(false);
        }
        self.copy_node(&src, &dst, info.is_dir)
    }

    fn copy_node(&self, src: &str, dst: &str, is_dir: bool) -> StorageResult<bool> {
        if !is_dir {
            let Some(content) = self.provider.read_file(src)? else {
                return Ok(false);
            };
            return self.write_file(dst, &content);
        }
        if !self.is_dir(dst)? && !self.mkdir(dst)? {
            return Ok(false);
        }
        for child in self.provider.list_directory(src)? {
            let from = path::join(src, &child);
            let Some(info) = self.provider.get_node_info(&from)? else {
                continue;
            };
            if !self.copy_node(&from, &path::join(dst, &child), info.is_dir)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Move a file or directory tree. Refused when the working directory
    /// lies inside the tree.
    pub fn mv(&self, src: &str, dst: &str) -> StorageResult<bool> {
        let src_full = self.resolve_path(src);
        if src_full == "/" || self.holds_cwd(&src_full) || !self.cp(&src_full, dst)? {
            return Ok(false);
        }
        self.rm_recursive(&src_full)
    }

    /// Copy several sources into an existing directory. Every source is
    /// attempted; returns true only if all succeeded.
    pub fn cp_many(&self, sources: &[&str], dst: &str) -> StorageResult<bool> {
        if !self.is_dir(dst)? {
            return Ok(false);
        }
        let mut ok = true;
        for src in sources {
            ok &= self.cp(src, dst)?;
        }
        Ok(ok)
    }

    /// Move several sources into an existing directory. Every source is
    /// attempted; returns true only if all succeeded.
    pub fn mv_many(&self, sources: &[&str], dst: &str) -> StorageResult<bool> {
        if !self.is_dir(dst)? {
            return Ok(false);
        }
        let mut ok = true;
        for src in sources {
            ok &= self.mv(src, dst)?;
        }
        Ok(ok)
    }

    /// Every path beneath `path` (just its children unless `recursive`).
    pub fn find(&self, path: &str, recursive: bool) -> StorageResult<Traversal> {
        Ok(traversal::walk(
            self.provider.as_ref(),
            &self.resolve_path(path),
            recursive,
            |_| true,
        ))
    }

    /// Paths beneath `path` whose basename matches the glob `pattern`.
    pub fn search(&self, path: &str, pattern: &str, recursive: bool) -> StorageResult<Traversal> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| storage::StorageError::InvalidPattern(e.to_string()))?;
        Ok(traversal::walk(
            self.provider.as_ref(),
            &self.resolve_path(path),
            recursive,
            |name| pattern.matches(name),
        ))
    }

    /// Provider statistics.
    pub fn storage_stats(&self) -> StorageResult<StorageStats> {
        self.provider.get_storage_stats()
    }

    /// Reclaim temporary files.
    pub fn cleanup(&self) -> StorageResult<CleanupStats> {
        self.provider.cleanup()
    }

    /// Working directory, provider and policy summary.
    pub fn fs_info(&self) -> StorageResult<FsInfo> {
        Ok(FsInfo {
            current_directory: self.cwd.clone(),
            provider: self.provider_name(),
            security_enabled: self.security.is_some(),
            read_only: self.is_read_only(),
            stats: self.storage_stats()?,
        })
    }
}
