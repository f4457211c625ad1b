//! Policy-enforcing storage provider wrapper.

use std::sync::{Arc, Mutex};

use super::handler::{Operation, PolicyChecker, PolicyDecision, SecurityPolicy, Violation};
use crate::path;
use crate::storage::{
    self, CleanupStats, NodeInfo, StorageProvider, StorageResult, StorageStats, TEMP_DIR,
    now_millis,
};

/// Privileged access to the wrapped provider.
///
/// Only handed out while a [`SecurityWrapper`] is being constructed, so
/// bootstrap writes (allowed-path directories, seed content) skip the checks
/// without any runtime bypass flag.
#[derive(Debug)]
pub struct Bootstrap<'a> {
    inner: &'a dyn StorageProvider,
}

impl Bootstrap<'_> {
    /// Create `dir` and any missing ancestors.
    pub fn create_dir_all(&self, dir: &str) -> StorageResult<bool> {
        storage::create_dir_all(self.inner, dir)
    }

    /// Create a node without policy checks.
    pub fn create_node(&self, node: &NodeInfo) -> StorageResult<bool> {
        self.inner.create_node(node)
    }

    /// Create (if needed) and write a file without policy checks.
    pub fn write_file(&self, file: &str, content: &str) -> StorageResult<bool> {
        let file = path::normalize(file);
        if self.inner.get_node_info(&file)?.is_none()
            && !self.inner.create_node(&NodeInfo::for_path(&file, false))?
        {
            return Ok(false);
        }
        self.inner.write_file(&file, content)
    }
}

/// A storage provider that enforces a [`SecurityPolicy`] on every mutation.
///
/// Rejections never surface as errors: the call returns the same `Ok(false)`
/// a structural failure would, and an entry is appended to the violation
/// log. Reads pass straight through.
///
/// With a total size quota in force, each write takes one
/// [`get_storage_stats`](StorageProvider::get_storage_stats) pass over the
/// inner provider to learn the current total. Without one, no scan happens.
#[derive(Debug)]
pub struct SecurityWrapper {
    inner: Arc<dyn StorageProvider>,
    checker: PolicyChecker,
    name: String,
    violations: Mutex<Vec<Violation>>,
}

impl SecurityWrapper {
    /// Wrap `inner`, creating every allowed path first.
    pub fn new(inner: Arc<dyn StorageProvider>, policy: SecurityPolicy) -> StorageResult<Self> {
        Self::with_setup(inner, policy, |_| Ok(()))
    }

    /// Wrap `inner`, creating every allowed path and then running `setup`
    /// with privileged access before any check applies.
    pub fn with_setup<F>(
        inner: Arc<dyn StorageProvider>,
        policy: SecurityPolicy,
        setup: F,
    ) -> StorageResult<Self>
    where
        F: FnOnce(&Bootstrap<'_>) -> StorageResult<()>,
    {
        let checker = policy.compile()?;
        {
            let bootstrap = Bootstrap {
                inner: inner.as_ref(),
            };
            for allowed in &policy.allowed_paths {
                if path::normalize(allowed) != "/" && !bootstrap.create_dir_all(allowed)? {
                    tracing::warn!(path = %allowed, "could not create allowed path");
                }
            }
            setup(&bootstrap)?;
        }
        let name = format!("security({})", inner.name());
        Ok(Self {
            inner,
            checker,
            name,
            violations: Mutex::new(Vec::new()),
        })
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &Arc<dyn StorageProvider> {
        &self.inner
    }

    /// The policy being enforced.
    pub fn policy(&self) -> &SecurityPolicy {
        self.checker.policy()
    }

    /// Whether every mutation is rejected.
    pub fn is_read_only(&self) -> bool {
        self.policy().read_only
    }

    /// A snapshot of the violation log, oldest first.
    pub fn violations(&self) -> Vec<Violation> {
        self.violations
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Empty the violation log.
    pub fn clear_violations(&self) {
        if let Ok(mut log) = self.violations.lock() {
            log.clear();
        }
    }

    /// Record the decision; returns true if the operation may proceed.
    fn admit(&self, operation: Operation, target: &str, decision: PolicyDecision) -> bool {
        let PolicyDecision::Deny(reason) = decision else {
            return true;
        };
        tracing::warn!(
            operation = %operation,
            path = %target,
            reason = %reason,
            "security violation"
        );
        if let Ok(mut log) = self.violations.lock() {
            log.push(Violation {
                operation,
                path: target.to_string(),
                reason: reason.to_string(),
                timestamp: now_millis(),
            });
        }
        false
    }

    fn check_path(&self, operation: Operation, target: &str) -> bool {
        self.admit(operation, target, self.checker.check_path(target))
    }
}

impl StorageProvider for SecurityWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self) -> StorageResult<bool> {
        self.inner.initialize()
    }

    fn get_node_info(&self, path: &str) -> StorageResult<Option<NodeInfo>> {
        self.inner.get_node_info(path)
    }

    fn create_node(&self, node: &NodeInfo) -> StorageResult<bool> {
        let target = node.get_path();
        if !self.check_path(Operation::CreateNode, &target) {
            return Ok(false);
        }
        self.inner.create_node(node)
    }

    fn list_directory(&self, path: &str) -> StorageResult<Vec<String>> {
        self.inner.list_directory(path)
    }

    fn write_file(&self, file: &str, content: &str) -> StorageResult<bool> {
        let target = path::normalize(file);
        if !self.check_path(Operation::WriteFile, &target) {
            return Ok(false);
        }
        let existing = self
            .inner
            .get_node_info(&target)?
            .and_then(|info| info.size)
            .unwrap_or(0);
        let new_len = content.len() as u64;
        let total = if new_len <= self.policy().max_file_size && self.checker.limits_total() {
            self.inner.get_storage_stats()?.total_size_bytes
        } else {
            0
        };
        let decision = self.checker.check_size(new_len, existing, total);
        if !self.admit(Operation::WriteFile, &target, decision) {
            return Ok(false);
        }
        self.inner.write_file(&target, content)
    }

    fn read_file(&self, path: &str) -> StorageResult<Option<String>> {
        self.inner.read_file(path)
    }

    fn delete_node(&self, path: &str) -> StorageResult<bool> {
        let target = path::normalize(path);
        if !self.check_path(Operation::DeleteNode, &target) {
            return Ok(false);
        }
        self.inner.delete_node(&target)
    }

    fn touch(&self, path: &str) -> StorageResult<bool> {
        let target = path::normalize(path);
        if !self.check_path(Operation::Touch, &target) {
            return Ok(false);
        }
        self.inner.touch(&target)
    }

    fn get_storage_stats(&self) -> StorageResult<StorageStats> {
        let mut stats = self.inner.get_storage_stats()?;
        let policy = self.policy();
        stats.provider = self.name.clone();
        stats
            .extra
            .insert("max_file_size".to_string(), policy.max_file_size.into());
        stats
            .extra
            .insert("max_total_size".to_string(), policy.max_total_size.into());
        stats
            .extra
            .insert("read_only".to_string(), policy.read_only.into());
        stats.extra.insert(
            "allowed_paths".to_string(),
            policy.allowed_paths.clone().into(),
        );
        stats.extra.insert(
            "security_violations".to_string(),
            (self.violations().len() as u64).into(),
        );
        Ok(stats)
    }

    fn cleanup(&self) -> StorageResult<CleanupStats> {
        if self.is_read_only() {
            self.admit(
                Operation::Cleanup,
                TEMP_DIR,
                PolicyDecision::Deny(super::handler::REASON_READ_ONLY),
            );
            return Ok(CleanupStats::default());
        }
        self.inner.cleanup()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::policy::handler::{
        REASON_DENIED_PATTERN, REASON_FILE_TOO_LARGE, REASON_NOT_ALLOWED, REASON_QUOTA,
        REASON_READ_ONLY, REASON_TOO_DEEP,
    };
    use crate::storage::MemoryStorageProvider;
    use crate::storage::testing::InstrumentedProvider;

    fn memory() -> Arc<dyn StorageProvider> {
        let provider = MemoryStorageProvider::new();
        provider.initialize().unwrap();
        Arc::new(provider)
    }

    fn wrap(policy: SecurityPolicy) -> SecurityWrapper {
        SecurityWrapper::new(memory(), policy).unwrap()
    }

    fn reasons(wrapper: &SecurityWrapper) -> Vec<String> {
        wrapper.violations().into_iter().map(|v| v.reason).collect()
    }

    #[test]
    fn test_read_only_blocks_mutations_but_not_reads() {
        let wrapper = SecurityWrapper::with_setup(
            memory(),
            SecurityPolicy::default().with_read_only(true),
            |b| {
                b.write_file("/test.txt", "Test content")?;
                Ok(())
            },
        )
        .unwrap();

        assert!(wrapper.get_node_info("/test.txt").unwrap().is_some());
        assert_eq!(
            wrapper.read_file("/test.txt").unwrap().as_deref(),
            Some("Test content")
        );

        assert!(!wrapper.write_file("/test.txt", "Modified content").unwrap());
        assert!(!wrapper.create_node(&NodeInfo::file("new.txt", "/")).unwrap());
        assert!(!wrapper.delete_node("/test.txt").unwrap());

        assert_eq!(reasons(&wrapper), vec![REASON_READ_ONLY; 3]);
        assert!(wrapper.is_read_only());
    }

    #[test]
    fn test_file_size_limit_boundary() {
        let wrapper = wrap(SecurityPolicy::unrestricted().with_max_file_size(500));
        wrapper.create_node(&NodeInfo::file("small.txt", "/")).unwrap();

        assert!(wrapper.write_file("/small.txt", &"x".repeat(500)).unwrap());
        assert!(wrapper.violations().is_empty());

        assert!(!wrapper.write_file("/small.txt", &"x".repeat(501)).unwrap());
        assert_eq!(reasons(&wrapper), vec![REASON_FILE_TOO_LARGE]);
        assert_eq!(wrapper.read_file("/small.txt").unwrap().unwrap().len(), 500);
    }

    #[test]
    fn test_allowed_paths_are_bootstrapped() {
        let wrapper = wrap(SecurityPolicy::unrestricted().with_allowed_paths(["/home", "/tmp"]));
        assert!(wrapper.get_node_info("/home").unwrap().unwrap().is_dir);
        assert!(wrapper.get_node_info("/tmp").unwrap().unwrap().is_dir);

        assert!(wrapper.create_node(&NodeInfo::file("test.txt", "/home")).unwrap());
        assert!(wrapper.create_node(&NodeInfo::file("temp.txt", "/tmp")).unwrap());
        assert!(!wrapper.create_node(&NodeInfo::directory("etc", "/")).unwrap());

        assert_eq!(reasons(&wrapper), vec![REASON_NOT_ALLOWED]);
    }

    #[test]
    fn test_denied_patterns() {
        let wrapper = wrap(SecurityPolicy::unrestricted().with_denied_patterns([r"\.exe$", r"^\."]));
        assert!(wrapper.create_node(&NodeInfo::file("test.txt", "/")).unwrap());
        assert!(!wrapper.create_node(&NodeInfo::file("test.exe", "/")).unwrap());
        assert!(!wrapper.create_node(&NodeInfo::file(".hidden", "/")).unwrap());
        assert_eq!(reasons(&wrapper), vec![REASON_DENIED_PATTERN; 2]);
    }

    #[test]
    fn test_depth_limit() {
        let wrapper = SecurityWrapper::with_setup(
            memory(),
            SecurityPolicy::unrestricted().with_max_path_depth(2),
            |b| {
                b.create_dir_all("/level1/level2/level3")?;
                Ok(())
            },
        )
        .unwrap();

        assert!(wrapper.create_node(&NodeInfo::file("file.txt", "/level1")).unwrap());
        assert!(
            !wrapper
                .create_node(&NodeInfo::file("deep.txt", "/level1/level2/level3"))
                .unwrap()
        );
        assert_eq!(reasons(&wrapper), vec![REASON_TOO_DEEP]);
    }

    #[test]
    fn test_total_quota() {
        let wrapper = wrap(SecurityPolicy::unrestricted().with_max_total_size(200));
        for name in ["file1.txt", "file2.txt", "file3.txt"] {
            wrapper.create_node(&NodeInfo::file(name, "/")).unwrap();
        }
        assert!(wrapper.write_file("/file1.txt", &"x".repeat(100)).unwrap());
        assert!(wrapper.write_file("/file2.txt", &"x".repeat(50)).unwrap());
        assert!(!wrapper.write_file("/file3.txt", &"x".repeat(100)).unwrap());
        // Rewriting an existing file counts only its growth.
        assert!(wrapper.write_file("/file1.txt", &"x".repeat(150)).unwrap());

        assert_eq!(reasons(&wrapper), vec![REASON_QUOTA]);
    }

    #[test]
    fn test_stats_scanned_only_under_total_quota() {
        let counted = Arc::new(InstrumentedProvider::new());
        counted.initialize().unwrap();
        let wrapper =
            SecurityWrapper::new(counted.clone(), SecurityPolicy::unrestricted()).unwrap();
        wrapper.create_node(&NodeInfo::file("free.txt", "/")).unwrap();
        let baseline = counted.stats_calls();
        for _ in 0..3 {
            assert!(wrapper.write_file("/free.txt", "data").unwrap());
        }
        assert_eq!(counted.stats_calls(), baseline);

        let counted = Arc::new(InstrumentedProvider::new());
        counted.initialize().unwrap();
        let wrapper = SecurityWrapper::new(
            counted.clone(),
            SecurityPolicy::unrestricted()
                .with_max_total_size(1024)
                .with_max_file_size(8),
        )
        .unwrap();
        wrapper.create_node(&NodeInfo::file("capped.txt", "/")).unwrap();
        let baseline = counted.stats_calls();
        assert!(wrapper.write_file("/capped.txt", "data").unwrap());
        assert_eq!(counted.stats_calls(), baseline + 1);

        // An oversized file is refused before any scan.
        assert!(!wrapper.write_file("/capped.txt", "far too long").unwrap());
        assert_eq!(counted.stats_calls(), baseline + 1);
        assert_eq!(reasons(&wrapper), vec![REASON_FILE_TOO_LARGE]);
    }

    #[test]
    fn test_violation_log_and_clear() {
        let wrapper = SecurityWrapper::with_setup(
            memory(),
            SecurityPolicy::unrestricted()
                .with_read_only(true)
                .with_denied_paths(["/etc"])
                .with_denied_patterns([r"\.exe$"]),
            |b| {
                b.create_node(&NodeInfo::file("test.txt", "/"))?;
                Ok(())
            },
        )
        .unwrap();

        wrapper.write_file("/test.txt", "Modified").unwrap();
        wrapper.create_node(&NodeInfo::file("program.exe", "/")).unwrap();
        wrapper.create_node(&NodeInfo::file("config", "/etc")).unwrap();

        let log = wrapper.violations();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].operation, Operation::WriteFile);
        assert_eq!(log[0].path, "/test.txt");
        assert_eq!(log[1].operation, Operation::CreateNode);
        assert_eq!(log[2].path, "/etc/config");

        wrapper.clear_violations();
        assert!(wrapper.violations().is_empty());
    }

    #[test]
    fn test_stats_carry_policy_fields() {
        let wrapper = wrap(SecurityPolicy::default());
        wrapper.create_node(&NodeInfo::file("a.exe", "/")).unwrap();

        let stats = wrapper.get_storage_stats().unwrap();
        assert_eq!(stats.provider, "security(memory)");
        assert_eq!(stats.extra["max_file_size"], 10 * 1024 * 1024);
        assert_eq!(stats.extra["read_only"], false);
        assert_eq!(stats.extra["security_violations"], 1);
    }

    #[test]
    fn test_read_only_cleanup_is_refused() {
        let wrapper = SecurityWrapper::with_setup(
            memory(),
            SecurityPolicy::unrestricted().with_read_only(true),
            |b| {
                b.create_dir_all("/tmp")?;
                b.write_file("/tmp/scratch", "data")?;
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(wrapper.cleanup().unwrap(), CleanupStats::default());
        assert!(wrapper.get_node_info("/tmp/scratch").unwrap().is_some());
        assert_eq!(wrapper.violations()[0].operation, Operation::Cleanup);
    }
}
