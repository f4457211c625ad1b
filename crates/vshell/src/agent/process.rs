//! Agent processes and their lifecycle states.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::definition::AgentDefinition;
use super::llm::Message;

/// Lifecycle state of an [`AgentProcess`].
///
/// `Pending -> Running -> {Completed, Failed, Terminated}`, with
/// `Running <-> Suspended`. Terminal states are never left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Created, not started
    Pending,
    /// Generating
    Running,
    /// Paused by the manager
    Suspended,
    /// Finished with output
    Completed,
    /// Timed out or errored
    Failed,
    /// Killed
    Terminated,
}

impl ProcessState {
    /// Running or suspended.
    pub fn is_active(self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::Suspended)
    }

    /// Completed, failed or terminated.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Completed | ProcessState::Failed | ProcessState::Terminated
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Pending => "pending",
            ProcessState::Running => "running",
            ProcessState::Suspended => "suspended",
            ProcessState::Completed => "completed",
            ProcessState::Failed => "failed",
            ProcessState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Agent memory: a JSON object.
pub type Memory = serde_json::Map<String, serde_json::Value>;

/// One run of an agent definition.
///
/// Only the [`AgentProcessManager`](super::AgentProcessManager) changes a
/// process; everything else reads it through the accessors.
#[derive(Debug)]
pub struct AgentProcess {
    pid: String,
    seq: u64,
    definition: Arc<AgentDefinition>,
    pub(super) state: ProcessState,
    pub(super) start_time: Option<Instant>,
    pub(super) end_time: Option<Instant>,
    pub(super) input_buffer: String,
    pub(super) output_buffer: String,
    pub(super) error_buffer: String,
    pub(super) context: Vec<Message>,
    pub(super) memory: Memory,
    background: bool,
    cancel: CancellationToken,
}

impl AgentProcess {
    pub(super) fn new(seq: u64, definition: AgentDefinition, background: bool) -> Self {
        Self {
            pid: format!("agent_{}", seq),
            seq,
            definition: Arc::new(definition),
            state: ProcessState::Pending,
            start_time: None,
            end_time: None,
            input_buffer: String::new(),
            output_buffer: String::new(),
            error_buffer: String::new(),
            context: Vec::new(),
            memory: Memory::new(),
            background,
            cancel: CancellationToken::new(),
        }
    }

    /// Process identifier, `agent_<n>`.
    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub(super) fn seq(&self) -> u64 {
        self.seq
    }

    /// The definition being run.
    pub fn definition(&self) -> &Arc<AgentDefinition> {
        &self.definition
    }

    /// Current state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// When the run started.
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    /// When the run ended or was killed.
    pub fn end_time(&self) -> Option<Instant> {
        self.end_time
    }

    /// Input given to the run.
    pub fn input_buffer(&self) -> &str {
        &self.input_buffer
    }

    /// Output of a completed run.
    pub fn output_buffer(&self) -> &str {
        &self.output_buffer
    }

    /// Failure or cancellation message.
    pub fn error_buffer(&self) -> &str {
        &self.error_buffer
    }

    /// The conversation: system, user, then assistant messages.
    pub fn context(&self) -> &[Message] {
        &self.context
    }

    /// Memory carried by this process.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Whether the process was started in the background.
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Whether the process is running or suspended.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Time spent running: zero before start, frozen once ended.
    pub fn get_runtime(&self) -> Duration {
        let Some(start) = self.start_time else {
            return Duration::ZERO;
        };
        let end = self.end_time.unwrap_or_else(Instant::now);
        end.saturating_duration_since(start)
    }

    pub(super) fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the unit of work without touching the state.
    pub(super) fn cancel_work(&self) {
        self.cancel.cancel();
    }

    /// Cancel the unit of work and force `Terminated`.
    pub(super) fn terminate(&mut self) {
        self.cancel.cancel();
        self.state = ProcessState::Terminated;
        self.end_time = Some(Instant::now());
    }
}
