//! vshell: an in-process Unix-like shell over a pluggable virtual filesystem.
//!
//! Files live in a [`StorageProvider`] (memory, SQLite or an object store),
//! optionally wrapped by a [`SecurityWrapper`] that enforces a
//! [`SecurityPolicy`]. The [`VirtualFileSystem`] layers path resolution and
//! Unix-like operations on top, the [`Shell`] interprets command lines
//! against it, and the [`agent`] module runs model-driven processes that use
//! shell commands as tools.

pub mod agent;
pub mod commands;
pub mod config;
pub mod path;
pub mod policy;
pub mod shell;
pub mod storage;
pub mod vfs;

pub use agent::{AgentDefinition, AgentError, AgentProcessManager, MockLlm, ProcessState};
pub use commands::{Command, CommandError, CommandRegistry};
pub use config::{ConfigError, ShellConfig};
pub use policy::{SecurityPolicy, SecurityProfile, SecurityWrapper};
pub use shell::Shell;
pub use storage::{NodeInfo, StorageError, StorageProvider, StorageResult};
pub use vfs::VirtualFileSystem;
