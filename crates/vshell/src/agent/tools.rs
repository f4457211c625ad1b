//! Shell commands exposed to agents as tools.
//!
//! This module provides:
//!
//! - [`ToolSpec`] - a tool's name, description and JSON Schema parameters
//! - [`ToolExecutor`] - the seam a model calls tools through
//! - [`ShellToolExecutor`] - runs tools as shell command lines
//! - [`expand_tool_calls`] - the `TOOL[name](args)` text protocol

use std::sync::{Arc, LazyLock, Mutex};

use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::AgentError;
use crate::commands::CommandRegistry;
use crate::shell::Shell;
use crate::storage::StorageError;

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name; the shell command it runs
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for the tool's parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// A tool that runs the shell command `name` with a free-form argument
    /// string.
    pub fn for_command(name: impl Into<String>, usage: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: format!("Execute {} shell command. Usage: {}", name, usage.into()),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "args": {
                        "type": "string",
                        "description": "Arguments for the command"
                    }
                }
            }),
            name,
        }
    }

    /// Tools for the requested names that exist in `commands`, in request
    /// order. Unknown and repeated names are dropped.
    pub fn manifest(requested: &[String], commands: &CommandRegistry) -> Vec<ToolSpec> {
        let mut tools: Vec<ToolSpec> = Vec::new();
        for name in requested {
            if tools.iter().any(|t| &t.name == name) {
                continue;
            }
            match commands.get(name) {
                Some(command) => tools.push(ToolSpec::for_command(name, command.help())),
                None => tracing::debug!(tool = %name, "dropping unknown tool"),
            }
        }
        tools
    }
}

/// Runs a tool on behalf of a model.
pub trait ToolExecutor: Send + Sync {
    /// Run tool `name` with the raw argument string.
    fn execute_tool(&self, name: &str, args: &str) -> Result<String, AgentError>;
}

/// Executes tools as command lines on a shared shell.
///
/// The shell lock is held only for the duration of one synchronous
/// `execute` call.
#[derive(Debug, Clone)]
pub struct ShellToolExecutor {
    shell: Arc<Mutex<Shell>>,
}

impl ShellToolExecutor {
    /// An executor over `shell`.
    pub fn new(shell: Arc<Mutex<Shell>>) -> Self {
        Self { shell }
    }
}

impl ToolExecutor for ShellToolExecutor {
    fn execute_tool(&self, name: &str, args: &str) -> Result<String, AgentError> {
        let mut shell = self
            .shell
            .lock()
            .map_err(|_| AgentError::Storage(StorageError::LockPoisoned))?;
        if !shell.commands().contains(name) {
            return Ok(format!("Unknown tool: {}", name));
        }
        let line = format!("{} {}", name, args);
        tracing::debug!(tool = %name, args = %args, "executing tool");
        Ok(shell.execute(line.trim()))
    }
}

/// `TOOL[name]` with an optional `(args)` suffix.
#[allow(clippy::expect_used)]
static TOOL_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TOOL\[([^\]]+)\](?:\(([^)]*)\))?").expect("invalid regex")
});

fn run_call(executor: &dyn ToolExecutor, name: &str, args: &str) -> String {
    match executor.execute_tool(name, args) {
        Ok(output) => format!("[{} result: {}]", name, output),
        Err(err) => {
            tracing::error!(tool = %name, error = %err, "tool call failed");
            format!("[Error executing {}: {}]", name, err)
        }
    }
}

/// Replace every `TOOL[name](args)` and bare `TOOL[name]` in `text` with
/// the tool's result, `[name result: ...]`, or `[Error executing name: ...]`.
///
/// Only calls written in `text` run; tool output is inserted as-is and never
/// scanned for further calls.
pub fn expand_tool_calls(text: &str, executor: &dyn ToolExecutor) -> String {
    if !text.contains("TOOL[") {
        return text.to_string();
    }
    TOOL_CALL
        .replace_all(text, |caps: &Captures<'_>| {
            let args = caps.get(2).map_or("", |m| m.as_str());
            run_call(executor, &caps[1], args)
        })
        .into_owned()
}
