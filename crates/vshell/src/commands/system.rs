//! Session and housekeeping commands.

use super::{Command, CommandError, check_flags, parse_args};
use crate::shell::Shell;

/// Print the command history.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryCommand;

impl Command for HistoryCommand {
    fn name(&self) -> &'static str {
        "history"
    }

    fn help(&self) -> &'static str {
        "history - list previously entered command lines"
    }

    fn execute(&self, shell: &mut Shell, _args: &[String]) -> Result<String, CommandError> {
        let lines: Vec<String> = shell
            .history()
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>5}  {}", i + 1, line))
            .collect();
        Ok(lines.join("\n"))
    }
}

/// Describe the available commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpCommand;

impl Command for HelpCommand {
    fn name(&self) -> &'static str {
        "help"
    }

    fn help(&self) -> &'static str {
        "help [COMMAND] - list commands, or describe one"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        if let Some(topic) = args.first() {
            return match shell.commands().get(topic) {
                Some(command) => Ok(command.help().to_string()),
                None => Err(CommandError::Failed(format!(
                    "help: no help topics match '{}'",
                    topic
                ))),
            };
        }
        let mut out = vec!["Available commands:".to_string()];
        out.extend(
            shell
                .commands()
                .iter()
                .map(|command| format!("  {}", command.help())),
        );
        Ok(out.join("\n"))
    }
}

/// Report storage usage against the applied limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaCommand;

/// Render a byte count with a binary unit suffix.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", size, UNITS[unit])
}

impl Command for QuotaCommand {
    fn name(&self) -> &'static str {
        "quota"
    }

    fn help(&self) -> &'static str {
        "quota [-h] - show storage usage and limits (-h: human-readable sizes)"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        let parsed = parse_args(args);
        check_flags("quota", &parsed, "h")?;
        let size = |bytes: u64| {
            if parsed.has('h') {
                human_size(bytes)
            } else {
                bytes.to_string()
            }
        };

        let stats = shell.fs().storage_stats()?;
        let mut lines = vec![
            format!("Provider: {}", stats.provider),
            format!("Files: {}", stats.file_count),
            format!("Directories: {}", stats.directory_count),
            format!("Used: {}", size(stats.total_size_bytes)),
        ];
        match shell.fs().security() {
            Some(wrapper) => {
                let policy = wrapper.policy();
                lines.push(format!("File limit: {}", size(policy.max_file_size)));
                lines.push(format!("Total limit: {}", size(policy.max_total_size)));
                let available = policy.max_total_size.saturating_sub(stats.total_size_bytes);
                lines.push(format!("Available: {}", size(available)));
                lines.push(format!("Read-only: {}", if policy.read_only { "yes" } else { "no" }));
                lines.push(format!("Violations: {}", wrapper.violations().len()));
            }
            None => lines.push("Limits: none".to_string()),
        }
        Ok(lines.join("\n"))
    }
}

/// End the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitCommand;

impl Command for ExitCommand {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn help(&self) -> &'static str {
        "exit - leave the shell"
    }

    fn execute(&self, shell: &mut Shell, _args: &[String]) -> Result<String, CommandError> {
        shell.stop();
        Ok("Goodbye!".to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::commands::CdCommand;
    use crate::policy::SecurityPolicy;
    use crate::storage::MemoryStorageProvider;
    use crate::vfs::VirtualFileSystem;

    #[test]
    fn test_history_is_numbered() {
        let mut shell = Shell::new().unwrap();
        shell.execute("pwd");
        shell.execute("echo hi");
        assert_eq!(
            shell.execute("history"),
            "    1  pwd\n    2  echo hi\n    3  history"
        );
    }

    #[test]
    fn test_help() {
        let mut shell = Shell::new().unwrap();
        let all = shell.execute("help");
        assert!(all.starts_with("Available commands:"));
        assert!(all.contains("mkdir [-p]"));
        assert!(all.contains("quota [-h]"));

        assert_eq!(shell.execute("help cd"), CdCommand.help());
        assert_eq!(
            shell.execute("help nosuch"),
            "help: no help topics match 'nosuch'"
        );
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0B");
        assert_eq!(human_size(1023), "1023B");
        assert_eq!(human_size(1536), "1.5K");
        assert_eq!(human_size(10 * 1024 * 1024), "10.0M");
    }

    #[test]
    fn test_quota_without_policy() {
        let mut shell = Shell::new().unwrap();
        shell.fs().write_file("/tmp/x", "12345").unwrap();
        let out = shell.execute("quota");
        assert!(out.contains("Provider: memory"));
        assert!(out.contains("Files: 1"));
        assert!(out.contains("Used: 5"));
        assert!(out.ends_with("Limits: none"));
    }

    #[test]
    fn test_quota_with_policy() {
        let fs = VirtualFileSystem::with_security(
            Arc::new(MemoryStorageProvider::new()),
            SecurityPolicy::unrestricted()
                .with_max_file_size(2048)
                .with_max_total_size(4096),
        )
        .unwrap();
        let mut shell = Shell::with_fs(fs).unwrap();
        shell.fs().write_file("/tmp/x", &"x".repeat(1024)).unwrap();
        shell.fs().write_file("/tmp/y", &"y".repeat(4096)).unwrap();

        let out = shell.execute("quota -h");
        assert!(out.contains("Provider: security(memory)"));
        assert!(out.contains("Used: 1.0K"));
        assert!(out.contains("File limit: 2.0K"));
        assert!(out.contains("Total limit: 4.0K"));
        assert!(out.contains("Available: 3.0K"));
        assert!(out.contains("Violations: 1"));

        assert_eq!(shell.execute("quota -g"), "quota: invalid option -- 'g'");
    }

    #[test]
    fn test_exit_command_stops() {
        let mut shell = Shell::new().unwrap();
        assert!(shell.is_running());
        assert_eq!(shell.execute("exit 0"), "Goodbye!");
        assert!(!shell.is_running());
    }
}
