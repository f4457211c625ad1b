//! Agent definition files.
//!
//! An agent file is a `#!agent` marker line followed by a YAML mapping:
//!
//! ```text
//! #!agent
//! name: reviewer
//! model: gpt-4
//! system_prompt: You review shell scripts.
//! tools: [ls, cat]
//! memory: persistent
//! timeout: 30
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AgentError;
use crate::vfs::VirtualFileSystem;

const SHEBANG: &str = "#!agent";

/// Where an agent reads input from or writes output to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    /// Standard input
    Stdin,
    /// Standard output
    Stdout,
    /// A file in the virtual filesystem
    File,
    /// A socket
    Socket,
    /// A pipe between processes
    Pipe,
}

impl IoMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "stdin" => Some(IoMode::Stdin),
            "stdout" => Some(IoMode::Stdout),
            "file" => Some(IoMode::File),
            "socket" => Some(IoMode::Socket),
            "pipe" => Some(IoMode::Pipe),
            _ => None,
        }
    }
}

/// How long an agent's memory lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Nothing is remembered
    None,
    /// Remembered for the lifetime of one process
    #[default]
    Session,
    /// Stored in the filesystem between runs
    Persistent,
}

impl MemoryMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(MemoryMode::None),
            "session" => Some(MemoryMode::Session),
            "persistent" => Some(MemoryMode::Persistent),
            _ => None,
        }
    }
}

/// Declarative description of an agent. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentDefinition {
    /// Agent name; also keys persistent memory
    pub name: String,
    /// Model identifier passed to the LLM
    pub model: String,
    /// System message seeded into every run
    pub system_prompt: String,
    /// Shell commands the agent may call
    pub tools: Vec<String>,
    /// Input channel
    #[serde(rename = "input")]
    pub input_mode: IoMode,
    /// Output channel
    #[serde(rename = "output")]
    pub output_mode: IoMode,
    /// Context window in tokens
    pub context_size: u32,
    /// Memory lifetime
    #[serde(rename = "memory")]
    pub memory_mode: MemoryMode,
    /// Sampling temperature
    pub temperature: f64,
    /// Completion length cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Extra environment for the agent
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Run time limit in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Default for AgentDefinition {
    fn default() -> Self {
        Self {
            name: "unnamed_agent".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: String::new(),
            tools: Vec::new(),
            input_mode: IoMode::Stdin,
            output_mode: IoMode::Stdout,
            context_size: 4096,
            memory_mode: MemoryMode::Session,
            temperature: 0.7,
            max_tokens: None,
            environment: BTreeMap::new(),
            timeout: None,
        }
    }
}

/// The YAML body as written. Mode fields stay loosely typed so a bad value
/// can fall back instead of failing the whole file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDefinition {
    name: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    tools: Option<Vec<String>>,
    input: Option<serde_yaml::Value>,
    output: Option<serde_yaml::Value>,
    memory: Option<serde_yaml::Value>,
    context_size: Option<u32>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    environment: Option<BTreeMap<String, String>>,
    timeout: Option<u64>,
}

fn soft_mode<T: Copy + fmt::Debug>(
    field: &str,
    value: Option<&serde_yaml::Value>,
    parse: fn(&str) -> Option<T>,
    fallback: T,
) -> T {
    let Some(value) = value else {
        return fallback;
    };
    match value.as_str().and_then(parse) {
        Some(mode) => mode,
        None => {
            tracing::warn!(field, value = ?value, fallback = ?fallback, "invalid mode, using default");
            fallback
        }
    }
}

/// The text after a leading `#!agent` line, or `None` if the first line is
/// anything else. Trailing whitespace on that line is allowed.
fn strip_shebang(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let (first, body) = text.split_once('\n').unwrap_or((text, ""));
    let rest = first.strip_prefix(SHEBANG)?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(body)
}

impl AgentDefinition {
    /// Parse a definition, tolerating a missing `#!agent` line.
    pub fn from_str_lenient(text: &str) -> Result<Self, AgentError> {
        let text = text.trim();
        Self::from_yaml_body(strip_shebang(text).unwrap_or(text))
    }

    /// Load and strictly parse a definition stored in the virtual
    /// filesystem.
    pub fn from_vfs(fs: &VirtualFileSystem, path: &str) -> Result<Self, AgentError> {
        match fs.read_file(path)? {
            Some(text) => text.parse(),
            None => Err(AgentError::NotFound(path.to_string())),
        }
    }

    fn from_yaml_body(body: &str) -> Result<Self, AgentError> {
        let raw = if body.trim().is_empty() {
            RawDefinition::default()
        } else {
            serde_yaml::from_str::<Option<RawDefinition>>(body)
                .map_err(|e| AgentError::InvalidYaml(e.to_string()))?
                .unwrap_or_default()
        };

        let defaults = Self::default();
        Ok(Self {
            name: raw.name.unwrap_or(defaults.name),
            model: raw.model.unwrap_or(defaults.model),
            system_prompt: raw.system_prompt.unwrap_or(defaults.system_prompt),
            tools: raw.tools.unwrap_or(defaults.tools),
            input_mode: soft_mode("input", raw.input.as_ref(), IoMode::parse, IoMode::Stdin),
            output_mode: soft_mode("output", raw.output.as_ref(), IoMode::parse, IoMode::Stdout),
            memory_mode: soft_mode(
                "memory",
                raw.memory.as_ref(),
                MemoryMode::parse,
                MemoryMode::Session,
            ),
            context_size: raw.context_size.unwrap_or(defaults.context_size),
            temperature: raw.temperature.unwrap_or(defaults.temperature),
            max_tokens: raw.max_tokens,
            environment: raw.environment.unwrap_or_default(),
            timeout: raw.timeout,
        })
    }

    /// The run time limit, if any.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Render back to agent file text, `#!agent` line included.
    pub fn to_yaml(&self) -> Result<String, AgentError> {
        let body = serde_yaml::to_string(self).map_err(|e| AgentError::InvalidYaml(e.to_string()))?;
        Ok(format!("{}\n{}", SHEBANG, body))
    }
}

impl FromStr for AgentDefinition {
    type Err = AgentError;

    /// Parse a definition whose first line must be `#!agent`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let body = strip_shebang(text).ok_or(AgentError::MissingShebang)?;
        Self::from_yaml_body(body)
    }
}
