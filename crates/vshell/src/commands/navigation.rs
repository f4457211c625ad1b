//! cd, pwd and ls.

use super::{Command, CommandError, check_flags, parse_args};
use crate::path;
use crate::shell::Shell;

/// Change the working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdCommand;

impl Command for CdCommand {
    fn name(&self) -> &'static str {
        "cd"
    }

    fn help(&self) -> &'static str {
        "cd [DIR] - change the working directory (default: $HOME)"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        let target = match args {
            [] => shell.get_env("HOME").unwrap_or("/").to_string(),
            [dir] => dir.clone(),
            _ => return Err(CommandError::Usage("cd: too many arguments".to_string())),
        };
        if shell.fs_mut().cd(&target)? {
            return Ok(String::new());
        }
        let reason = if shell.fs().exists(&target)? {
            "Not a directory"
        } else {
            "No such file or directory"
        };
        Err(CommandError::Failed(format!("cd: {}: {}", target, reason)))
    }
}

/// Print the working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PwdCommand;

impl Command for PwdCommand {
    fn name(&self) -> &'static str {
        "pwd"
    }

    fn help(&self) -> &'static str {
        "pwd - print the working directory"
    }

    fn execute(&self, shell: &mut Shell, _args: &[String]) -> Result<String, CommandError> {
        Ok(shell.fs().pwd().to_string())
    }
}

/// List directory contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsCommand;

impl LsCommand {
    fn long_line(shell: &Shell, dir: &str, name: &str) -> Result<String, CommandError> {
        let owner = shell.get_env("USER").unwrap_or("user");
        let info = shell.fs().get_node_info(&path::join(dir, name))?;
        let (mode, size) = match &info {
            Some(info) if info.is_dir => ("drwxr-xr-x", 0),
            Some(info) => ("-rw-r--r--", info.size.unwrap_or(0)),
            None => ("----------", 0),
        };
        Ok(format!("{} 1 {} staff {:>8} {}", mode, owner, size, name))
    }
}

impl Command for LsCommand {
    fn name(&self) -> &'static str {
        "ls"
    }

    fn help(&self) -> &'static str {
        "ls [-l] [-a] [PATH] - list directory contents"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        let parsed = parse_args(args);
        check_flags("ls", &parsed, "la")?;
        let long = parsed.has('l');
        let all = parsed.has('a');

        let target = parsed.operands.first().copied().unwrap_or(".");
        let full = shell.fs().resolve_path(target);
        let Some(info) = shell.fs().get_node_info(&full)? else {
            return Err(CommandError::Failed(format!(
                "ls: cannot access '{}': No such file or directory",
                target
            )));
        };
        if !info.is_dir {
            let (dir, name) = path::split(&full);
            return if long {
                Self::long_line(shell, &dir, &name)
            } else {
                Ok(target.to_string())
            };
        }

        let mut names = shell.fs().ls(Some(&full))?;
        if all {
            names.splice(0..0, [".".to_string(), "..".to_string()]);
        } else {
            names.retain(|n| !n.starts_with('.'));
        }

        if !long {
            return Ok(names.join(" "));
        }
        let lines = names
            .iter()
            .map(|name| match name.as_str() {
                "." | ".." => Ok(format!(
                    "drwxr-xr-x 1 {} staff {:>8} {}",
                    shell.get_env("USER").unwrap_or("user"),
                    0,
                    name
                )),
                _ => Self::long_line(shell, &full, name),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines.join("\n"))
    }
}
