//! Builtin commands for the interpreter.
//!
//! Commands are stateless values implementing [`Command`]; all state they
//! touch lives on the [`Shell`] passed to `execute`. The table is built once
//! by [`register_builtins`] and shared immutably.

mod environment;
mod filesystem;
mod navigation;
mod system;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::shell::Shell;
use crate::storage::StorageError;

pub use environment::{EchoCommand, EnvCommand, ExportCommand};
pub use filesystem::{
    CatCommand, CpCommand, FindCommand, MkdirCommand, MvCommand, RmCommand, RmdirCommand,
    TouchCommand,
};
pub use navigation::{CdCommand, LsCommand, PwdCommand};
pub use system::{ExitCommand, HelpCommand, HistoryCommand, QuotaCommand};

/// Errors a command reports back to the interpreter.
///
/// The interpreter renders these as the command's output, so messages are
/// already formatted like a Unix tool's stderr line.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command ran and failed
    #[error("{0}")]
    Failed(String),
    /// The arguments were not understood
    #[error("{0}")]
    Usage(String),
    /// The storage backend failed underneath the command
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A command the interpreter can dispatch to.
pub trait Command: Send + Sync + fmt::Debug {
    /// Name the command is invoked by.
    fn name(&self) -> &'static str;

    /// One-line usage and description, shown by `help`.
    fn help(&self) -> &'static str;

    /// Run the command with its arguments (excluding the command name).
    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError>;
}

/// Immutable name to command table.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// A table holding the given commands.
    pub fn new(commands: BTreeMap<String, Arc<dyn Command>>) -> Self {
        Self { commands }
    }

    /// A table holding every builtin.
    pub fn builtin() -> Self {
        let mut commands = BTreeMap::new();
        register_builtins(&mut commands);
        Self::new(commands)
    }

    /// Look up a command by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Registered commands, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Command>> {
        self.commands.values()
    }
}

fn insert(commands: &mut BTreeMap<String, Arc<dyn Command>>, command: impl Command + 'static) {
    commands.insert(command.name().to_string(), Arc::new(command));
}

/// Register all builtin commands.
pub fn register_builtins(commands: &mut BTreeMap<String, Arc<dyn Command>>) {
    insert(commands, CdCommand);
    insert(commands, PwdCommand);
    insert(commands, LsCommand);
    insert(commands, MkdirCommand);
    insert(commands, TouchCommand);
    insert(commands, CatCommand);
    insert(commands, RmCommand);
    insert(commands, RmdirCommand);
    insert(commands, CpCommand);
    insert(commands, MvCommand);
    insert(commands, FindCommand);
    insert(commands, EchoCommand);
    insert(commands, EnvCommand);
    insert(commands, ExportCommand);
    insert(commands, HistoryCommand);
    insert(commands, HelpCommand);
    insert(commands, QuotaCommand);
    insert(commands, ExitCommand);
}

/// Arguments split into single-letter flags and operands.
///
/// `-la` yields flags `l` and `a`. A lone `-` and everything after `--` are
/// operands.
#[derive(Debug, Default)]
pub(crate) struct ParsedArgs<'a> {
    pub flags: BTreeSet<char>,
    pub operands: Vec<&'a str>,
}

impl ParsedArgs<'_> {
    pub fn has(&self, flag: char) -> bool {
        self.flags.contains(&flag)
    }
}

pub(crate) fn parse_args(args: &[String]) -> ParsedArgs<'_> {
    let mut parsed = ParsedArgs::default();
    let mut only_operands = false;
    for arg in args {
        if only_operands {
            parsed.operands.push(arg);
        } else if arg == "--" {
            only_operands = true;
        } else if let Some(flags) = arg.strip_prefix('-')
            && !flags.is_empty()
            && !flags.starts_with('-')
        {
            parsed.flags.extend(flags.chars());
        } else {
            parsed.operands.push(arg);
        }
    }
    parsed
}

/// Reject any flag outside `allowed`.
pub(crate) fn check_flags(
    name: &str,
    parsed: &ParsedArgs<'_>,
    allowed: &str,
) -> Result<(), CommandError> {
    match parsed.flags.iter().find(|f| !allowed.contains(**f)) {
        Some(flag) => Err(CommandError::Usage(format!(
            "{}: invalid option -- '{}'",
            name, flag
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_table() {
        let registry = CommandRegistry::builtin();
        for name in [
            "cd", "pwd", "ls", "mkdir", "touch", "cat", "echo", "rm", "rmdir", "cp", "mv", "find",
            "env", "export", "history", "help", "quota", "exit",
        ] {
            assert!(registry.contains(name), "missing {}", name);
            assert_eq!(registry.get(name).unwrap().name(), name);
        }
        assert!(registry.get("awk").is_none());
    }

    #[test]
    fn test_parse_args() {
        let args = owned(&["-la", "dir", "-", "--", "-x"]);
        let parsed = parse_args(&args);
        assert!(parsed.has('l'));
        assert!(parsed.has('a'));
        assert!(!parsed.has('x'));
        assert_eq!(parsed.operands, vec!["dir", "-", "-x"]);
    }

    #[test]
    fn test_check_flags() {
        let args = owned(&["-p", "-z"]);
        let parsed = parse_args(&args);
        let err = check_flags("mkdir", &parsed, "p").unwrap_err();
        assert_eq!(err.to_string(), "mkdir: invalid option -- 'z'");
        assert!(check_flags("mkdir", &parsed, "pz").is_ok());
    }
}
