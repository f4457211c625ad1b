//! Security policy definitions and path checks.

use std::fmt;
use std::str::FromStr;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path;
use crate::storage::{StorageError, StorageResult};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Reason recorded when a mutation is attempted in read-only mode.
pub const REASON_READ_ONLY: &str = "read-only mode";
/// Reason recorded when a path falls under a denied path.
pub const REASON_DENIED_PATH: &str = "Path in denied paths list";
/// Reason recorded when a path matches a denied pattern.
pub const REASON_DENIED_PATTERN: &str = "Path matches denied pattern";
/// Reason recorded when a path is outside every allowed path.
pub const REASON_NOT_ALLOWED: &str = "Path not in allowed paths list";
/// Reason recorded when a path is nested too deeply.
pub const REASON_TOO_DEEP: &str = "Path depth exceeds maximum";
/// Reason recorded when one file would exceed the size limit.
pub const REASON_FILE_TOO_LARGE: &str = "File size exceeds maximum";
/// Reason recorded when a write would exceed the total quota.
pub const REASON_QUOTA: &str = "Total storage quota exceeded";

/// The mutating storage operation being checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Creating a file or directory node
    CreateNode,
    /// Replacing file content
    WriteFile,
    /// Deleting a node
    DeleteNode,
    /// Updating a node's modification time
    Touch,
    /// Reclaiming temporary data
    Cleanup,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateNode => "create_node",
            Operation::WriteFile => "write_file",
            Operation::DeleteNode => "delete_node",
            Operation::Touch => "touch",
            Operation::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// The result of a policy check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The operation is allowed.
    Allow,
    /// The operation is denied with a reason.
    Deny(&'static str),
}

impl PolicyDecision {
    /// Returns true if the operation is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }

    /// Returns the denial reason if denied, None if allowed.
    pub fn denial_reason(&self) -> Option<&'static str> {
        match self {
            PolicyDecision::Allow => None,
            PolicyDecision::Deny(reason) => Some(reason),
        }
    }
}

/// One rejected operation, as recorded in the violation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Operation that was rejected
    pub operation: Operation,
    /// Normalized path the operation targeted
    pub path: String,
    /// Fixed reason string
    pub reason: String,
    /// Unix milliseconds when the rejection happened
    pub timestamp: u64,
}

/// Named policy presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProfile {
    /// Moderate limits, everything under `/` allowed
    #[default]
    Default,
    /// Small limits, only `/home` and `/tmp` writable
    Strict,
    /// Default limits with every mutation rejected
    #[serde(rename = "readonly")]
    ReadOnly,
    /// Tight limits confined to `/sandbox` and `/tmp`
    Untrusted,
    /// Generous limits with nothing denied
    Testing,
}

/// Error returned when parsing an unknown profile name.
#[derive(Debug, Error)]
#[error("unknown security profile: {0}")]
pub struct UnknownProfile(pub String);

impl SecurityProfile {
    /// Every preset, in a stable order.
    pub const ALL: [SecurityProfile; 5] = [
        SecurityProfile::Default,
        SecurityProfile::Strict,
        SecurityProfile::ReadOnly,
        SecurityProfile::Untrusted,
        SecurityProfile::Testing,
    ];

    /// The profile's name as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            SecurityProfile::Default => "default",
            SecurityProfile::Strict => "strict",
            SecurityProfile::ReadOnly => "readonly",
            SecurityProfile::Untrusted => "untrusted",
            SecurityProfile::Testing => "testing",
        }
    }

    /// The policy this preset stands for.
    pub fn policy(&self) -> SecurityPolicy {
        SecurityPolicy::from_profile(*self)
    }
}

impl fmt::Display for SecurityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityProfile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SecurityProfile::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownProfile(s.to_string()))
    }
}

/// Limits and path rules enforced by a
/// [`SecurityWrapper`](super::SecurityWrapper).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Largest content a single file may hold, in bytes
    pub max_file_size: u64,
    /// Largest total of all file contents, in bytes
    pub max_total_size: u64,
    /// Reject every mutation
    pub read_only: bool,
    /// Mutations must target a path under one of these; empty allows all
    pub allowed_paths: Vec<String>,
    /// Paths (and everything beneath them) that may never be mutated
    pub denied_paths: Vec<String>,
    /// Regular expressions matched against the full path and each component
    pub denied_patterns: Vec<String>,
    /// Deepest permitted path, counted in components
    pub max_path_depth: usize,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::from_profile(SecurityProfile::Default)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SecurityPolicy {
    /// A policy that allows everything. Handy as a base for one-off limits.
    pub fn unrestricted() -> Self {
        Self {
            max_file_size: u64::MAX,
            max_total_size: u64::MAX,
            read_only: false,
            allowed_paths: Vec::new(),
            denied_paths: Vec::new(),
            denied_patterns: Vec::new(),
            max_path_depth: usize::MAX,
        }
    }

    /// The settings behind a named preset.
    pub fn from_profile(profile: SecurityProfile) -> Self {
        let system_paths = strings(&["/etc/passwd", "/etc/shadow", "/etc/sudoers"]);
        let risky_names = strings(&[r"\.(exe|dll|so|dylib|bat|cmd)$", r"^\.env$"]);
        let with_hidden = {
            let mut patterns = risky_names.clone();
            patterns.push(r"^\.".to_string());
            patterns
        };

        match profile {
            SecurityProfile::Default => Self {
                max_file_size: 10 * MIB,
                max_total_size: 100 * MIB,
                read_only: false,
                allowed_paths: strings(&["/"]),
                denied_paths: system_paths,
                denied_patterns: risky_names,
                max_path_depth: 10,
            },
            SecurityProfile::Strict => Self {
                max_file_size: MIB,
                max_total_size: 20 * MIB,
                read_only: false,
                allowed_paths: strings(&["/home", "/tmp"]),
                denied_paths: system_paths,
                denied_patterns: with_hidden,
                max_path_depth: 5,
            },
            SecurityProfile::ReadOnly => Self {
                read_only: true,
                ..Self::from_profile(SecurityProfile::Default)
            },
            SecurityProfile::Untrusted => Self {
                max_file_size: 512 * KIB,
                max_total_size: 5 * MIB,
                read_only: false,
                allowed_paths: strings(&["/sandbox", "/tmp"]),
                denied_paths: system_paths,
                denied_patterns: with_hidden,
                max_path_depth: 5,
            },
            SecurityProfile::Testing => Self {
                max_file_size: 100 * MIB,
                max_total_size: GIB,
                read_only: false,
                allowed_paths: strings(&["/"]),
                denied_paths: Vec::new(),
                denied_patterns: Vec::new(),
                max_path_depth: 20,
            },
        }
    }

    /// Set the per-file size limit.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set the total quota.
    pub fn with_max_total_size(mut self, bytes: u64) -> Self {
        self.max_total_size = bytes;
        self
    }

    /// Toggle read-only mode.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Replace the allowed path list.
    pub fn with_allowed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the denied path list.
    pub fn with_denied_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denied_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the denied pattern list.
    pub fn with_denied_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denied_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the depth limit.
    pub fn with_max_path_depth(mut self, depth: usize) -> Self {
        self.max_path_depth = depth;
        self
    }

    /// Compile the denied patterns into a checker.
    pub fn compile(&self) -> StorageResult<PolicyChecker> {
        let patterns = self
            .denied_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| StorageError::InvalidPattern(format!("{}: {}", p, e))))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(PolicyChecker {
            policy: self.clone(),
            patterns,
        })
    }
}

/// A [`SecurityPolicy`] with its patterns compiled, ready to answer checks.
#[derive(Clone, Debug)]
pub struct PolicyChecker {
    policy: SecurityPolicy,
    patterns: Vec<Regex>,
}

impl PolicyChecker {
    /// The policy being enforced.
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Run the path rules, in order: read-only, denied paths and patterns,
    /// allowed paths, depth.
    pub fn check_path(&self, path: &str) -> PolicyDecision {
        let path = path::normalize(path);
        let policy = &self.policy;

        if policy.read_only {
            return PolicyDecision::Deny(REASON_READ_ONLY);
        }
        if policy
            .denied_paths
            .iter()
            .any(|denied| path::is_within(&path, denied))
        {
            return PolicyDecision::Deny(REASON_DENIED_PATH);
        }
        if self.matches_denied_pattern(&path) {
            return PolicyDecision::Deny(REASON_DENIED_PATTERN);
        }
        if !policy.allowed_paths.is_empty()
            && !policy
                .allowed_paths
                .iter()
                .any(|allowed| path::is_within(&path, allowed))
        {
            return PolicyDecision::Deny(REASON_NOT_ALLOWED);
        }
        if path::depth(&path) > policy.max_path_depth {
            return PolicyDecision::Deny(REASON_TOO_DEEP);
        }
        PolicyDecision::Allow
    }

    /// True if the policy caps the total bytes stored.
    pub fn limits_total(&self) -> bool {
        self.policy.max_total_size != u64::MAX
    }

    /// Size rules for replacing a file of `existing` bytes with `new_len`
    /// bytes when `current_total` bytes are stored overall.
    pub fn check_size(&self, new_len: u64, existing: u64, current_total: u64) -> PolicyDecision {
        if new_len > self.policy.max_file_size {
            return PolicyDecision::Deny(REASON_FILE_TOO_LARGE);
        }
        let projected = current_total.saturating_sub(existing).saturating_add(new_len);
        if projected > self.policy.max_total_size {
            return PolicyDecision::Deny(REASON_QUOTA);
        }
        PolicyDecision::Allow
    }

    fn matches_denied_pattern(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| {
            re.is_match(path) || path::segments(path).into_iter().any(|part| re.is_match(part))
        })
    }
}
