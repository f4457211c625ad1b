//! The command interpreter.
//!
//! A [`Shell`] owns a [`VirtualFileSystem`], an environment map, the shared
//! command table and the history. [`Shell::execute`] is the error boundary:
//! whatever a command does, the caller gets a string back.
//!
//! # Example
//!
//! ```rust,ignore
//! use vshell::Shell;
//!
//! let mut shell = Shell::new()?;
//! shell.execute("mkdir -p /home/user/notes");
//! shell.execute("echo remember the milk > /home/user/notes/todo");
//! assert_eq!(shell.execute("cat /home/user/notes/todo"), "remember the milk\n");
//! ```

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::commands::{CommandError, CommandRegistry};
use crate::config::{ConfigError, ShellConfig};
use crate::storage::StorageResult;
use crate::vfs::VirtualFileSystem;

/// Host name shown in the prompt unless configured.
pub const DEFAULT_HOSTNAME: &str = "vshell";

/// Home directory of the default user.
pub const DEFAULT_HOME: &str = "/home/user";

/// Where a command's output goes when the line ends in `> path` or `>> path`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Redirect {
    target: String,
    append: bool,
}

/// Split trailing output redirection out of `args`.
///
/// Accepts `> file`, `>file`, `>> file` and `>>file`. Tokens after the
/// target stay arguments of the command.
fn split_redirect(args: Vec<String>) -> Result<(Vec<String>, Option<Redirect>), String> {
    let Some(at) = args.iter().position(|a| a.starts_with('>')) else {
        return Ok((args, None));
    };
    let mut args = args;
    let token = args.remove(at);
    let (append, inline) = match token.strip_prefix(">>") {
        Some(rest) => (true, rest),
        None => (false, &token[1..]),
    };
    let target = if !inline.is_empty() {
        inline.to_string()
    } else if at < args.len() {
        args.remove(at)
    } else {
        return Err("syntax error near unexpected token `newline'".to_string());
    };
    if target.starts_with('>') {
        return Err(format!("syntax error near unexpected token `{}'", target));
    }
    Ok((args, Some(Redirect { target, append })))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "command panicked".to_string()
    }
}

/// A Unix-like command interpreter over a virtual filesystem.
#[derive(Debug)]
pub struct Shell {
    fs: VirtualFileSystem,
    environ: BTreeMap<String, String>,
    commands: Arc<CommandRegistry>,
    history: Vec<String>,
    running: bool,
    hostname: String,
}

impl Shell {
    /// A shell over an in-memory filesystem with the builtin commands.
    pub fn new() -> StorageResult<Self> {
        Self::with_fs(VirtualFileSystem::new()?)
    }

    /// A shell over `fs` with the builtin commands.
    pub fn with_fs(fs: VirtualFileSystem) -> StorageResult<Self> {
        Self::with_registry(fs, Arc::new(CommandRegistry::builtin()))
    }

    /// A shell over `fs` dispatching to `commands`.
    ///
    /// The home directory is created if missing; the working directory is
    /// left where `fs` has it.
    pub fn with_registry(
        fs: VirtualFileSystem,
        commands: Arc<CommandRegistry>,
    ) -> StorageResult<Self> {
        let mut shell = Self {
            environ: default_environment(fs.pwd()),
            fs,
            commands,
            history: Vec::new(),
            running: true,
            hostname: DEFAULT_HOSTNAME.to_string(),
        };
        shell.ensure_home(DEFAULT_HOME)?;
        Ok(shell)
    }

    /// Build a shell from configuration: provider, security policy,
    /// environment and home directory. The session starts in the home
    /// directory.
    pub fn from_config(config: &ShellConfig) -> Result<Self, ConfigError> {
        let mut fs = VirtualFileSystem::from_provider_name(
            &config.provider.name,
            &config.provider.args,
        )?;
        if let Some(security) = &config.security {
            fs.apply_security(security.to_policy())?;
        }
        let mut shell = Self::with_fs(fs)?;
        shell.hostname = config.hostname.clone();

        let home = shell.fs.resolve_path(&config.home);
        shell.set_env("HOME", &home);
        for (key, value) in &config.environment {
            shell.set_env(key, value);
        }
        shell.ensure_home(&home)?;
        if shell.fs.cd(&home)? {
            shell.sync_pwd();
        } else {
            tracing::warn!(home = %home, "could not enter home directory");
        }
        Ok(shell)
    }

    fn ensure_home(&self, home: &str) -> StorageResult<()> {
        match self.fs.get_node_info(home)? {
            Some(info) if !info.is_dir => {
                tracing::warn!(home = %home, "home path exists but is not a directory");
            }
            Some(_) => {}
            None => {
                if !self.fs.mkdir_all(home)? {
                    tracing::warn!(home = %home, "could not create home directory");
                }
            }
        }
        Ok(())
    }

    /// The filesystem.
    pub fn fs(&self) -> &VirtualFileSystem {
        &self.fs
    }

    /// The filesystem, mutably (for `cd`).
    pub fn fs_mut(&mut self) -> &mut VirtualFileSystem {
        &mut self.fs
    }

    /// The environment, sorted by name.
    pub fn environ(&self) -> &BTreeMap<String, String> {
        &self.environ
    }

    /// One environment variable.
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.environ.get(key).map(String::as_str)
    }

    /// Set an environment variable.
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.environ.insert(key.to_string(), value.to_string());
    }

    /// The command table.
    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// Every non-empty line executed so far.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Whether the session is still accepting input.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// End the session.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Host name shown in the prompt.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Change the host name shown in the prompt.
    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.hostname = hostname.into();
    }

    fn sync_pwd(&mut self) {
        let pwd = self.fs.pwd().to_string();
        self.environ.insert("PWD".to_string(), pwd);
    }

    /// Split a line into the command name and its arguments.
    pub fn parse_command(line: &str) -> Option<(String, Vec<String>)> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let command = parts.next()?;
        Some((command, parts.collect()))
    }

    /// Run one command line and return its output.
    ///
    /// Never fails: unknown commands, command errors and panics inside a
    /// command all come back as text.
    pub fn execute(&mut self, line: &str) -> String {
        let line = line.trim();
        if line.is_empty() {
            return String::new();
        }
        self.history.push(line.to_string());
        if line == "exit" {
            self.stop();
            return "Goodbye!".to_string();
        }

        let Some((name, args)) = Self::parse_command(line) else {
            return String::new();
        };
        let Some(command) = self.commands.get(&name) else {
            return format!("{}: command not found", name);
        };
        let (args, redirect) = match split_redirect(args) {
            Ok(split) => split,
            Err(message) => return format!("{}: {}", name, message),
        };

        tracing::debug!(command = %name, args = ?args, "dispatching command");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| command.execute(self, &args)));
        if name == "cd" {
            self.sync_pwd();
        }

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                match &err {
                    CommandError::Storage(source) => {
                        tracing::error!(command = %name, error = %source, "command failed");
                    }
                    other => tracing::debug!(command = %name, error = %other, "command failed"),
                }
                return err.to_string();
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(command = %name, error = %message, "command panicked");
                return format!("Error executing command: {}", message);
            }
        };

        match redirect {
            Some(redirect) => self.redirect(&name, &output, &redirect),
            None => output,
        }
    }

    fn redirect(&self, name: &str, output: &str, redirect: &Redirect) -> String {
        let mut content = output.to_string();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        let written = if redirect.append {
            self.fs.append_file(&redirect.target, &content)
        } else {
            self.fs.write_file(&redirect.target, &content)
        };
        match written {
            Ok(true) => String::new(),
            Ok(false) => format!("{}: cannot write to '{}'", name, redirect.target),
            Err(err) => {
                tracing::error!(target_path = %redirect.target, error = %err, "redirect failed");
                format!("Error executing command: {}", err)
            }
        }
    }

    /// The prompt string, `user@host:pwd$ `.
    pub fn prompt(&self) -> String {
        format!(
            "{}@{}:{}$ ",
            self.get_env("USER").unwrap_or("user"),
            self.hostname,
            self.get_env("PWD").unwrap_or("/")
        )
    }

    /// Command names starting with `prefix`, sorted.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        self.commands
            .names()
            .filter(|name| name.starts_with(prefix))
            .map(str::to_string)
            .collect()
    }
}

fn default_environment(pwd: &str) -> BTreeMap<String, String> {
    [
        ("HOME", DEFAULT_HOME),
        ("PATH", "/bin:/usr/bin"),
        ("USER", "user"),
        ("SHELL", "/bin/vshell"),
        ("PWD", pwd),
        ("TERM", "xterm"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::commands::{Command, register_builtins};
    use crate::config::ShellConfig;

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_environment() {
        let shell = Shell::new().unwrap();
        for key in ["HOME", "PATH", "USER", "SHELL", "PWD", "TERM"] {
            assert!(shell.get_env(key).is_some(), "missing {}", key);
        }
        assert_eq!(shell.get_env("PWD"), Some("/"));
        assert!(shell.fs().is_dir(DEFAULT_HOME).unwrap());
        assert_eq!(shell.prompt(), "user@vshell:/$ ");
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            Shell::parse_command("  ls   -l /tmp "),
            Some(("ls".to_string(), owned(&["-l", "/tmp"])))
        );
        assert_eq!(Shell::parse_command("   "), None);
    }

    #[test]
    fn test_empty_line_is_not_recorded() {
        let mut shell = Shell::new().unwrap();
        assert_eq!(shell.execute("   "), "");
        assert!(shell.history().is_empty());
    }

    #[test]
    fn test_unknown_command() {
        let mut shell = Shell::new().unwrap();
        assert_eq!(shell.execute("frobnicate now"), "frobnicate: command not found");
        assert_eq!(shell.history(), ["frobnicate now"]);
    }

    #[test]
    fn test_exit_without_registered_command() {
        let fs = VirtualFileSystem::new().unwrap();
        let mut shell = Shell::with_registry(fs, Arc::new(CommandRegistry::default())).unwrap();
        assert_eq!(shell.execute("pwd"), "pwd: command not found");
        assert_eq!(shell.execute("exit"), "Goodbye!");
        assert!(!shell.is_running());
    }

    #[test]
    fn test_prompt_follows_cd() {
        let mut shell = Shell::new().unwrap();
        shell.set_hostname("box");
        shell.execute("cd /home/user");
        assert_eq!(shell.prompt(), "user@box:/home/user$ ");
    }

    #[test]
    fn test_redirection() {
        let mut shell = Shell::new().unwrap();
        assert_eq!(shell.execute("echo first > /tmp/out"), "");
        assert_eq!(shell.execute("echo second >> /tmp/out"), "");
        assert_eq!(shell.execute("cat /tmp/out"), "first\nsecond\n");

        assert_eq!(shell.execute("echo again >/tmp/out"), "");
        assert_eq!(shell.execute("echo more >>/tmp/out"), "");
        assert_eq!(shell.execute("cat /tmp/out"), "again\nmore\n");

        assert_eq!(
            shell.execute("echo nowhere >"),
            "echo: syntax error near unexpected token `newline'"
        );
        assert_eq!(
            shell.execute("echo x > /missing/dir/file"),
            "echo: cannot write to '/missing/dir/file'"
        );
    }

    #[test]
    fn test_errors_are_not_redirected() {
        let mut shell = Shell::new().unwrap();
        assert_eq!(
            shell.execute("cat /nope > /tmp/err"),
            "cat: /nope: No such file or directory"
        );
        assert!(!shell.fs().exists("/tmp/err").unwrap());
    }

    #[derive(Debug)]
    struct Boom;

    impl Command for Boom {
        fn name(&self) -> &'static str {
            "boom"
        }
        fn help(&self) -> &'static str {
            "boom - always panics"
        }
        fn execute(&self, _shell: &mut Shell, _args: &[String]) -> Result<String, CommandError> {
            panic!("kaboom")
        }
    }

    #[test]
    fn test_panicking_command_is_contained() {
        let mut commands: BTreeMap<String, Arc<dyn Command>> = BTreeMap::new();
        register_builtins(&mut commands);
        commands.insert("boom".to_string(), Arc::new(Boom));
        let fs = VirtualFileSystem::new().unwrap();
        let mut shell = Shell::with_registry(fs, Arc::new(CommandRegistry::new(commands))).unwrap();

        assert_eq!(shell.execute("boom"), "Error executing command: kaboom");
        assert!(shell.is_running());
        assert_eq!(shell.execute("pwd"), "/");
    }

    #[test]
    fn test_complete() {
        let shell = Shell::new().unwrap();
        assert_eq!(shell.complete("c"), vec!["cat", "cd", "cp"]);
        assert_eq!(shell.complete("his"), vec!["history"]);
        assert!(shell.complete("zz").is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = ShellConfig::from_yaml_str(
            r#"
hostname: sandbox
home: /home/agent
environment:
  EDITOR: vi
security:
  profile: strict
"#,
        )
        .unwrap();
        let mut shell = Shell::from_config(&config).unwrap();

        assert_eq!(shell.fs().pwd(), "/home/agent");
        assert_eq!(shell.get_env("HOME"), Some("/home/agent"));
        assert_eq!(shell.get_env("PWD"), Some("/home/agent"));
        assert_eq!(shell.get_env("EDITOR"), Some("vi"));
        assert_eq!(shell.prompt(), "user@sandbox:/home/agent$ ");
        assert_eq!(shell.fs().provider_name(), "security(memory)");

        assert_eq!(shell.execute("touch /etc/motd"), "touch: cannot touch '/etc/motd'");
        assert_eq!(shell.execute("touch notes"), "");
    }
}
