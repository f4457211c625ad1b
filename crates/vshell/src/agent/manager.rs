//! The agent process table and the run state machine.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::AgentError;
use super::definition::{AgentDefinition, MemoryMode};
use super::llm::{GenerationRequest, LlmInterface, Message, MockLlm, Role};
use super::process::{AgentProcess, Memory, ProcessState};
use super::tools::{ShellToolExecutor, ToolSpec};
use crate::config::AgentsConfig;
use crate::shell::Shell;
use crate::storage::StorageError;

/// Shared handle to a process in the table.
pub type ProcessHandle = Arc<Mutex<AgentProcess>>;

/// Directory holding persistent agent memory, one JSON file per agent name.
pub const MEMORY_DIR: &str = "/var/agent_memory";

const CANCELLED_ERROR: &str = "Process was cancelled";
const CANCELLED_REPLY: &str = "Process cancelled";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the generation step ended.
enum Outcome {
    Completed(String),
    TimedOut(Duration),
    Cancelled,
    Errored(AgentError),
}

/// Runs `future`, giving up after `limit` if one is set.
async fn bounded<F: Future>(limit: Option<Duration>, future: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

/// Owns the process table and drives every state transition.
///
/// PIDs are `agent_<n>` from a counter that is never reset, so a PID is
/// never reused even after its process is cleaned up.
#[derive(Debug)]
pub struct AgentProcessManager {
    shell: Arc<Mutex<Shell>>,
    llm: Arc<dyn LlmInterface>,
    processes: Mutex<HashMap<String, ProcessHandle>>,
    next_pid: AtomicU64,
    default_timeout: Option<Duration>,
}

impl AgentProcessManager {
    /// A manager whose agents call tools on `shell` and generate with `llm`.
    pub fn new(shell: Arc<Mutex<Shell>>, llm: Arc<dyn LlmInterface>) -> Self {
        Self {
            shell,
            llm,
            processes: Mutex::new(HashMap::new()),
            next_pid: AtomicU64::new(1),
            default_timeout: None,
        }
    }

    /// A manager using [`MockLlm`] with the configured latency and default
    /// timeout.
    pub fn from_config(shell: Arc<Mutex<Shell>>, config: &AgentsConfig) -> Self {
        Self::new(shell, Arc::new(MockLlm::new(config.mock_latency)))
            .with_default_timeout(config.default_timeout)
    }

    /// Bound runs whose definition sets no timeout.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The shell agents operate on.
    pub fn shell(&self) -> &Arc<Mutex<Shell>> {
        &self.shell
    }

    /// Allocate the next PID and add a `Pending` process to the table.
    pub fn create_process(&self, definition: AgentDefinition, background: bool) -> ProcessHandle {
        let seq = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let process = AgentProcess::new(seq, definition, background);
        let pid = process.pid().to_string();
        tracing::info!(
            pid = %pid,
            agent = %process.definition().name,
            background,
            "created agent process"
        );
        let handle = Arc::new(Mutex::new(process));
        lock(&self.processes).insert(pid, Arc::clone(&handle));
        handle
    }

    /// Run a `Pending` process to a terminal state and return its reply.
    ///
    /// Timeouts, cancellation and model errors all come back as `Ok` text
    /// with the process in `Failed` or `Terminated`; the only `Err` is for a
    /// process that was not `Pending`.
    pub async fn run_process(
        &self,
        process: &ProcessHandle,
        input: &str,
    ) -> Result<String, AgentError> {
        let (pid, definition, cancel) = {
            let mut p = lock(process);
            if p.state != ProcessState::Pending {
                return Err(AgentError::NotPending(p.pid().to_string()));
            }
            p.state = ProcessState::Running;
            p.start_time = Some(Instant::now());
            p.input_buffer = input.to_string();
            let definition = Arc::clone(p.definition());
            if !definition.system_prompt.is_empty() {
                p.context
                    .push(Message::new(Role::System, definition.system_prompt.clone()));
            }
            if !input.is_empty() {
                p.context.push(Message::new(Role::User, input));
            }
            (p.pid().to_string(), definition, p.cancellation())
        };
        tracing::info!(pid = %pid, state = %ProcessState::Running, "agent process started");

        let memory = match definition.memory_mode {
            MemoryMode::Persistent => self.load_memory(&definition.name),
            MemoryMode::Session | MemoryMode::None => Memory::new(),
        };
        let request = {
            let mut p = lock(process);
            p.memory = memory;
            GenerationRequest {
                model: definition.model.clone(),
                messages: p.context.clone(),
                temperature: definition.temperature,
                max_tokens: definition.max_tokens,
            }
        };

        let outcome = match self.tool_manifest(&definition.tools) {
            Ok(tools) => {
                let limit = definition.timeout_duration().or(self.default_timeout);
                let executor = ShellToolExecutor::new(Arc::clone(&self.shell));
                let generation = self.llm.generate(&request, &tools, &executor);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Outcome::Cancelled,
                    result = bounded(limit, generation) => match result {
                        Some(Ok(text)) => Outcome::Completed(text),
                        Some(Err(err)) => Outcome::Errored(err),
                        None => Outcome::TimedOut(limit.unwrap_or_default()),
                    },
                }
            }
            Err(err) => Outcome::Errored(err),
        };
        Ok(self.finish(process, &pid, &definition, input, outcome))
    }

    fn tool_manifest(&self, requested: &[String]) -> Result<Vec<ToolSpec>, AgentError> {
        let shell = self
            .shell
            .lock()
            .map_err(|_| AgentError::Storage(StorageError::LockPoisoned))?;
        Ok(ToolSpec::manifest(requested, shell.commands()))
    }

    /// Apply the outcome to the process record and produce the reply.
    fn finish(
        &self,
        process: &ProcessHandle,
        pid: &str,
        definition: &AgentDefinition,
        input: &str,
        outcome: Outcome,
    ) -> String {
        let (reply, state, to_save) = {
            let mut p = lock(process);
            if p.end_time.is_none() {
                p.end_time = Some(Instant::now());
            }
            let outcome = if p.state == ProcessState::Terminated {
                Outcome::Cancelled
            } else {
                outcome
            };
            let mut to_save = None;
            let reply = match outcome {
                Outcome::Completed(text) => {
                    p.context.push(Message::new(Role::Assistant, text.clone()));
                    p.output_buffer = text.clone();
                    p.state = ProcessState::Completed;
                    if definition.memory_mode != MemoryMode::None {
                        record_run(&mut p.memory, input, &text);
                    }
                    if definition.memory_mode == MemoryMode::Persistent {
                        to_save = Some(p.memory.clone());
                    }
                    text
                }
                Outcome::TimedOut(limit) => {
                    p.state = ProcessState::Failed;
                    p.error_buffer = format!(
                        "Agent execution timed out after {} seconds",
                        limit.as_secs_f64()
                    );
                    p.error_buffer.clone()
                }
                Outcome::Cancelled => {
                    p.state = ProcessState::Terminated;
                    p.error_buffer = CANCELLED_ERROR.to_string();
                    CANCELLED_REPLY.to_string()
                }
                Outcome::Errored(err) => {
                    tracing::error!(pid = %pid, error = %err, "agent process failed");
                    p.state = ProcessState::Failed;
                    p.error_buffer = err.to_string();
                    format!("Agent error: {}", err)
                }
            };
            (reply, p.state, to_save)
        };
        tracing::info!(pid = %pid, state = %state, "agent process finished");
        if let Some(memory) = to_save {
            self.save_memory(&definition.name, &memory);
        }
        reply
    }

    /// Run `process` on the tokio runtime and return immediately.
    pub fn spawn_process(
        self: &Arc<Self>,
        process: ProcessHandle,
        input: impl Into<String>,
    ) -> JoinHandle<Result<String, AgentError>> {
        let manager = Arc::clone(self);
        let input = input.into();
        tokio::spawn(async move { manager.run_process(&process, &input).await })
    }

    /// Look up a process by PID.
    pub fn get_process(&self, pid: &str) -> Option<ProcessHandle> {
        lock(&self.processes).get(pid).cloned()
    }

    /// Every process in the table, oldest first.
    pub fn list_processes(&self) -> Vec<ProcessHandle> {
        let mut processes: Vec<ProcessHandle> = lock(&self.processes).values().cloned().collect();
        processes.sort_by_cached_key(|p| lock(p).seq());
        processes
    }

    /// Terminate an active process. False for unknown or inactive PIDs.
    pub fn kill_process(&self, pid: &str) -> bool {
        let Some(handle) = self.get_process(pid) else {
            return false;
        };
        let mut process = lock(&handle);
        if !process.is_active() {
            return false;
        }
        process.terminate();
        tracing::info!(pid = %pid, state = %process.state(), "agent process killed");
        true
    }

    /// Mark a running process suspended.
    pub fn suspend_process(&self, pid: &str) -> bool {
        self.transition(pid, ProcessState::Running, ProcessState::Suspended)
    }

    /// Mark a suspended process running again.
    pub fn resume_process(&self, pid: &str) -> bool {
        self.transition(pid, ProcessState::Suspended, ProcessState::Running)
    }

    fn transition(&self, pid: &str, from: ProcessState, to: ProcessState) -> bool {
        let Some(handle) = self.get_process(pid) else {
            return false;
        };
        let mut process = lock(&handle);
        if process.state != from {
            return false;
        }
        process.state = to;
        tracing::info!(pid = %pid, state = %to, "agent process state changed");
        true
    }

    /// Remove every completed, failed or terminated process. Returns how
    /// many were removed.
    pub fn cleanup_completed(&self) -> usize {
        let mut table = lock(&self.processes);
        let before = table.len();
        table.retain(|pid, handle| {
            let process = lock(handle);
            if !process.state().is_terminal() {
                return true;
            }
            process.cancel_work();
            tracing::debug!(pid = %pid, "removed agent process");
            false
        });
        before - table.len()
    }

    /// Terminate every active process, cancel any scheduled but not yet
    /// started run, then remove everything terminal.
    pub fn cleanup_all(&self) -> usize {
        for handle in self.list_processes() {
            let mut process = lock(&handle);
            if process.is_active() {
                process.terminate();
            } else if process.state() == ProcessState::Pending {
                process.cancel_work();
            }
        }
        self.cleanup_completed()
    }

    fn memory_path(agent: &str) -> String {
        format!("{}/{}.json", MEMORY_DIR, agent.replace('/', "_"))
    }

    fn load_memory(&self, agent: &str) -> Memory {
        let path = Self::memory_path(agent);
        let Ok(shell) = self.shell.lock() else {
            tracing::warn!(agent = %agent, "shell lock poisoned, starting with empty memory");
            return Memory::new();
        };
        match shell.fs().read_file(&path) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or_else(|err| {
                tracing::warn!(path = %path, error = %err, "corrupt agent memory, starting empty");
                Memory::new()
            }),
            Ok(None) => Memory::new(),
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "could not read agent memory");
                Memory::new()
            }
        }
    }

    fn save_memory(&self, agent: &str, memory: &Memory) {
        let path = Self::memory_path(agent);
        let Ok(shell) = self.shell.lock() else {
            tracing::warn!(agent = %agent, "shell lock poisoned, memory not saved");
            return;
        };
        let saved = serde_json::to_string_pretty(memory)
            .map_err(StorageError::from)
            .and_then(|text| {
                Ok(shell.fs().mkdir_all(MEMORY_DIR)? && shell.fs().write_file(&path, &text)?)
            });
        match saved {
            Ok(true) => tracing::debug!(path = %path, "saved agent memory"),
            Ok(false) => tracing::warn!(path = %path, "agent memory rejected by filesystem"),
            Err(err) => tracing::warn!(path = %path, error = %err, "could not save agent memory"),
        }
    }
}

/// Note a finished run in the agent's memory.
fn record_run(memory: &mut Memory, input: &str, output: &str) {
    let runs = memory
        .get("runs")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    memory.insert("runs".to_string(), (runs + 1).into());
    memory.insert("last_input".to_string(), input.into());
    memory.insert("last_output".to_string(), output.into());
}
