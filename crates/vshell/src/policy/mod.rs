//! Security policy enforcement for the virtual filesystem.
//!
//! A [`SecurityWrapper`] decorates any [`StorageProvider`](crate::storage::StorageProvider)
//! and checks every mutation against a [`SecurityPolicy`]:
//!
//! 1. read-only mode
//! 2. denied paths and denied patterns
//! 3. allowed paths
//! 4. path depth
//! 5. per-file size and total quota (writes only)
//!
//! A rejected call looks exactly like an ordinary failure to the caller
//! (`Ok(false)`); the reason is only visible in the violation log.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vshell::policy::{SecurityPolicy, SecurityProfile, SecurityWrapper};
//!
//! let policy = SecurityProfile::Strict.policy().with_max_file_size(4096);
//! let secured = SecurityWrapper::new(provider, policy)?;
//! assert!(!secured.write_file("/etc/passwd", "root::0:0")?);
//! assert_eq!(secured.violations().len(), 1);
//! ```

mod handler;
mod storage;

pub use handler::{
    Operation, PolicyChecker, PolicyDecision, REASON_DENIED_PATH, REASON_DENIED_PATTERN,
    REASON_FILE_TOO_LARGE, REASON_NOT_ALLOWED, REASON_QUOTA, REASON_READ_ONLY, REASON_TOO_DEEP,
    SecurityPolicy, SecurityProfile, UnknownProfile, Violation,
};
pub use storage::{Bootstrap, SecurityWrapper};
