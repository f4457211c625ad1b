//! Environment variable commands.

use super::{Command, CommandError};
use crate::shell::Shell;

/// Print the arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCommand;

impl Command for EchoCommand {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn help(&self) -> &'static str {
        "echo [TEXT]... - print the arguments separated by spaces"
    }

    fn execute(&self, _shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        Ok(args.join(" "))
    }
}

/// List environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCommand;

impl Command for EnvCommand {
    fn name(&self) -> &'static str {
        "env"
    }

    fn help(&self) -> &'static str {
        "env - print the environment as KEY=VALUE lines"
    }

    fn execute(&self, shell: &mut Shell, _args: &[String]) -> Result<String, CommandError> {
        let lines: Vec<String> = shell
            .environ()
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        Ok(lines.join("\n"))
    }
}

/// Set environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportCommand;

impl Command for ExportCommand {
    fn name(&self) -> &'static str {
        "export"
    }

    fn help(&self) -> &'static str {
        "export KEY=VALUE... - set environment variables"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        for arg in args {
            let Some((key, value)) = arg.split_once('=') else {
                continue;
            };
            if key.is_empty() {
                return Err(CommandError::Failed(format!(
                    "export: `{}': not a valid identifier",
                    arg
                )));
            }
            shell.set_env(key, value);
        }
        Ok(String::new())
    }
}
