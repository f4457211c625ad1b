//! Integration tests for agent processes.
//!
//! These tests verify the lifecycle through the public API:
//! - foreground runs, timeouts and model failures
//! - background scheduling, kill and cleanup
//! - definitions stored in the virtual filesystem
//! - tools reaching the shared shell

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use vshell::agent::{
    AgentDefinition, AgentError, AgentProcessManager, GenerationRequest, LlmInterface, MockLlm,
    ProcessState, ToolExecutor, ToolSpec,
};
use vshell::{Shell, ShellConfig};

/// Sleeps for a fixed time, then echoes the last user message.
#[derive(Debug)]
struct SlowEcho(Duration);

#[async_trait]
impl LlmInterface for SlowEcho {
    async fn generate(
        &self,
        request: &GenerationRequest,
        _tools: &[ToolSpec],
        _executor: &dyn ToolExecutor,
    ) -> Result<String, AgentError> {
        tokio::time::sleep(self.0).await;
        Ok(format!("echo: {}", request.last_user_message().unwrap_or_default()))
    }
}

fn shared_shell() -> Arc<Mutex<Shell>> {
    Arc::new(Mutex::new(Shell::new().unwrap()))
}

fn slow_manager(secs: u64) -> Arc<AgentProcessManager> {
    Arc::new(AgentProcessManager::new(
        shared_shell(),
        Arc::new(SlowEcho(Duration::from_secs(secs))),
    ))
}

// =============================================================================
// State machine
// =============================================================================

mod state_machine {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_failed() {
        let manager = slow_manager(2);
        let definition: AgentDefinition = "#!agent\nname: bot\ntimeout: 1\n".parse().unwrap();
        let process = manager.create_process(definition, false);

        let reply = manager.run_process(&process, "anything").await.unwrap();
        assert!(reply.contains("timed out"));

        let process = process.lock().unwrap();
        assert_eq!(process.state(), ProcessState::Failed);
        assert!(process.error_buffer().contains("timed out"));
        assert_eq!(process.get_runtime(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_completion() {
        let manager = slow_manager(1);
        let process = manager.create_process(AgentDefinition::default(), false);
        assert_eq!(process.lock().unwrap().state(), ProcessState::Pending);
        assert_eq!(process.lock().unwrap().get_runtime(), Duration::ZERO);

        let reply = manager.run_process(&process, "ping").await.unwrap();
        assert_eq!(reply, "echo: ping");
        let process = process.lock().unwrap();
        assert_eq!(process.state(), ProcessState::Completed);
        assert_eq!(process.output_buffer(), "echo: ping");
        assert!(process.end_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_is_idempotent() {
        let manager = slow_manager(30);
        let process = manager.create_process(AgentDefinition::default(), true);
        let task = manager.spawn_process(Arc::clone(&process), "long job");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(process.lock().unwrap().is_active());
        assert!(manager.kill_process("agent_1"));
        assert!(!manager.kill_process("agent_1"));

        assert_eq!(task.await.unwrap().unwrap(), "Process cancelled");
        let process = process.lock().unwrap();
        assert_eq!(process.state(), ProcessState::Terminated);
        assert!(process.end_time().is_some());
        assert_eq!(process.get_runtime(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pid_counter_survives_cleanup() {
        let manager = slow_manager(0);
        let first = manager.create_process(AgentDefinition::default(), false);
        let second = manager.create_process(AgentDefinition::default(), false);
        assert_eq!(first.lock().unwrap().pid(), "agent_1");
        assert_eq!(second.lock().unwrap().pid(), "agent_2");

        manager.run_process(&first, "").await.unwrap();
        assert_eq!(first.lock().unwrap().state(), ProcessState::Completed);
        assert_eq!(manager.cleanup_completed(), 1);

        let third = manager.create_process(AgentDefinition::default(), false);
        assert_eq!(third.lock().unwrap().pid(), "agent_3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_all_cancels_background_work() {
        let manager = slow_manager(60);
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let process = manager.create_process(AgentDefinition::default(), true);
                manager.spawn_process(process, "work")
            })
            .collect();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(manager.list_processes().len(), 3);

        assert_eq!(manager.cleanup_all(), 3);
        assert!(manager.list_processes().is_empty());
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "Process cancelled");
        }
    }
}

// =============================================================================
// Shell integration
// =============================================================================

mod with_shell {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_definition_loaded_from_vfs() {
        let shell = shared_shell();
        {
            let shell = shell.lock().unwrap();
            shell
                .fs()
                .write_file(
                    "/bin/lister.agent",
                    "#!agent\nname: lister\ntools: [ls]\nsystem_prompt: You list things.\n",
                )
                .unwrap();
        }
        let definition = {
            let shell = shell.lock().unwrap();
            AgentDefinition::from_vfs(shell.fs(), "/bin/lister.agent").unwrap()
        };
        let manager = AgentProcessManager::new(
            Arc::clone(&shell),
            Arc::new(MockLlm::new(Duration::from_millis(50))),
        );
        let process = manager.create_process(definition, false);
        let reply = manager.run_process(&process, "list the files").await.unwrap();
        assert_eq!(
            reply,
            "Here are the files in the current directory:\n[ls result: bin etc home tmp var]"
        );
        assert_eq!(process.lock().unwrap().context().len(), 3);
        assert_eq!(shell.lock().unwrap().history(), ["ls"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_without_tools_cannot_touch_shell() {
        let shell = shared_shell();
        let manager = AgentProcessManager::new(Arc::clone(&shell), Arc::new(MockLlm::default()));
        let definition: AgentDefinition = "#!agent\nname: mute\ntools: [rocket]\n".parse().unwrap();
        let process = manager.create_process(definition, false);
        let reply = manager.run_process(&process, "create a file").await.unwrap();
        assert!(reply.contains("don't have access"));
        assert!(shell.lock().unwrap().history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_default_timeout() {
        let config = ShellConfig::from_yaml_str(
            "agents:\n  default_timeout_ms: 50\n  mock_latency_ms: 200\n",
        )
        .unwrap();
        let shell = Arc::new(Mutex::new(Shell::from_config(&config).unwrap()));
        let manager = AgentProcessManager::from_config(shell, &config.agents);
        let process = manager.create_process(AgentDefinition::default(), false);

        let reply = manager.run_process(&process, "hello").await.unwrap();
        assert_eq!(reply, "Agent execution timed out after 0.05 seconds");
        assert_eq!(process.lock().unwrap().state(), ProcessState::Failed);
    }
}
