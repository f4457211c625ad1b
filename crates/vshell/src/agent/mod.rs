//! Agents: model-driven processes that use shell commands as tools.
//!
//! An agent is declared in a `#!agent` YAML file ([`AgentDefinition`]),
//! instantiated as an [`AgentProcess`], and driven through its lifecycle by
//! the [`AgentProcessManager`]. Text generation goes through the
//! [`LlmInterface`] seam; [`MockLlm`] answers offline.

mod definition;
mod llm;
mod manager;
mod process;
mod tools;

use thiserror::Error;

pub use definition::{AgentDefinition, IoMode, MemoryMode};
pub use llm::{GenerationRequest, LlmInterface, Message, MockLlm, Role};
pub use manager::{AgentProcessManager, MEMORY_DIR, ProcessHandle};
pub use process::{AgentProcess, Memory, ProcessState};
pub use tools::{ShellToolExecutor, ToolExecutor, ToolSpec, expand_tool_calls};

use crate::storage::StorageError;

/// Errors from loading or running agents.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Strict parsing requires the `#!agent` first line
    #[error("invalid agent file: missing #!agent shebang")]
    MissingShebang,
    /// The body is not a valid definition
    #[error("invalid agent YAML: {0}")]
    InvalidYaml(String),
    /// No agent file at the path
    #[error("agent file not found: {0}")]
    NotFound(String),
    /// Only a pending process can be run
    #[error("process {0} is not pending")]
    NotPending(String),
    /// The model failed
    #[error("llm error: {0}")]
    Llm(String),
    /// The filesystem failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}
