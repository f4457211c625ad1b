//! The language model seam.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::AgentError;
use super::tools::{ToolExecutor, ToolSpec, expand_tool_calls};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions from the agent definition
    System,
    /// Input handed to the agent
    User,
    /// Text produced by the model
    Assistant,
}

/// One entry of a conversation transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Text
    pub content: String,
}

impl Message {
    /// A message from `role`.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything a model needs for one completion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// Model identifier
    pub model: String,
    /// Transcript so far
    pub messages: Vec<Message>,
    /// Sampling temperature
    pub temperature: f64,
    /// Completion length cap
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A language model that can call shell tools while answering.
#[async_trait]
pub trait LlmInterface: Send + Sync + fmt::Debug {
    /// Produce the assistant reply for `request`. Tool calls the model makes
    /// go through `executor`, restricted to `tools`.
    async fn generate(
        &self,
        request: &GenerationRequest,
        tools: &[ToolSpec],
        executor: &dyn ToolExecutor,
    ) -> Result<String, AgentError>;
}

/// Offline stand-in for a model: waits a fixed latency, then answers from a
/// handful of keyword rules. Listing and file-creation requests are served
/// through the `ls` and `touch` tools when the agent has them.
#[derive(Clone, Debug)]
pub struct MockLlm {
    latency: Duration,
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl MockLlm {
    /// A mock that answers after `latency`.
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn reply(message: &str, tools: &[ToolSpec], executor: &dyn ToolExecutor) -> String {
        let has_tool = |name: &str| tools.iter().any(|t| t.name == name);
        let lower = message.to_lowercase();

        if message.is_empty() {
            return "Hello! I'm an AI agent running in your shell. How can I help you?".to_string();
        }
        if lower.contains("list") && lower.contains("files") {
            if !has_tool("ls") {
                return "I would list files here, but I don't have access to the ls command."
                    .to_string();
            }
            return expand_tool_calls(
                "Here are the files in the current directory:\nTOOL[ls]",
                executor,
            );
        }
        if lower.contains("create") && lower.contains("file") {
            if !has_tool("touch") {
                return "I would create a file, but I don't have access to file commands."
                    .to_string();
            }
            return expand_tool_calls(
                "I've created a file called example.txt\nTOOL[touch](example.txt)",
                executor,
            );
        }
        if lower.contains("hello") {
            const GREETINGS: [&str; 3] = [
                "Hello! How can I assist you today?",
                "Hi there! I'm ready to help with your tasks.",
                "Greetings! What would you like me to do?",
            ];
            return GREETINGS[message.len() % GREETINGS.len()].to_string();
        }
        if lower.contains("help") {
            return "I'm an AI agent that can:\n\
                    - Execute shell commands\n\
                    - Process and analyze text\n\
                    - Help with various tasks\n\
                    Try asking me to list files, create files, or analyze data!"
                .to_string();
        }
        if lower.contains("analyze") {
            return format!(
                "Analyzing input: '{}'\n- Length: {} characters\n- Words: {} words\n- Contains question: {}\nAnalysis complete.",
                message,
                message.chars().count(),
                message.split_whitespace().count(),
                if message.contains('?') { "True" } else { "False" },
            );
        }
        format!(
            "I understand you said: '{}'. As a mock agent, I have limited capabilities.",
            message
        )
    }
}

#[async_trait]
impl LlmInterface for MockLlm {
    async fn generate(
        &self,
        request: &GenerationRequest,
        tools: &[ToolSpec],
        executor: &dyn ToolExecutor,
    ) -> Result<String, AgentError> {
        tokio::time::sleep(self.latency).await;
        let message = request.last_user_message().unwrap_or_default();
        Ok(Self::reply(message, tools, executor))
    }
}
