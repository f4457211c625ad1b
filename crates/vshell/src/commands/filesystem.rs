//! File and directory manipulation commands.

use super::{Command, CommandError, check_flags, parse_args};
use crate::shell::Shell;
use crate::storage::StorageError;

fn failed(message: String) -> CommandError {
    CommandError::Failed(message)
}

/// Create directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct MkdirCommand;

impl Command for MkdirCommand {
    fn name(&self) -> &'static str {
        "mkdir"
    }

    fn help(&self) -> &'static str {
        "mkdir [-p] DIR... - create directories (-p: with parents, no error if existing)"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        let parsed = parse_args(args);
        check_flags("mkdir", &parsed, "p")?;
        if parsed.operands.is_empty() {
            return Err(CommandError::Usage("mkdir: missing operand".to_string()));
        }
        for dir in &parsed.operands {
            let created = if parsed.has('p') {
                shell.fs().mkdir_all(dir)?
            } else {
                shell.fs().mkdir(dir)?
            };
            if !created {
                return Err(failed(format!("mkdir: cannot create directory '{}'", dir)));
            }
        }
        Ok(String::new())
    }
}

/// Create files or update their modification time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TouchCommand;

impl Command for TouchCommand {
    fn name(&self) -> &'static str {
        "touch"
    }

    fn help(&self) -> &'static str {
        "touch FILE... - create empty files or update their timestamps"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        if args.is_empty() {
            return Err(CommandError::Usage("touch: missing file operand".to_string()));
        }
        for file in args {
            if !shell.fs().touch(file)? {
                return Err(failed(format!("touch: cannot touch '{}'", file)));
            }
        }
        Ok(String::new())
    }
}

/// Print file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatCommand;

impl Command for CatCommand {
    fn name(&self) -> &'static str {
        "cat"
    }

    fn help(&self) -> &'static str {
        "cat FILE... - concatenate files to the output"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        if args.is_empty() {
            return Err(CommandError::Usage("cat: missing operand".to_string()));
        }
        let mut out = String::new();
        for file in args {
            match shell.fs().read_file(file)? {
                Some(content) => out.push_str(&content),
                None if shell.fs().is_dir(file)? => {
                    return Err(failed(format!("cat: {}: Is a directory", file)));
                }
                None => return Err(failed(format!("cat: {}: No such file or directory", file))),
            }
        }
        Ok(out)
    }
}

/// Remove files and directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmCommand;

impl Command for RmCommand {
    fn name(&self) -> &'static str {
        "rm"
    }

    fn help(&self) -> &'static str {
        "rm [-r] [-f] PATH... - remove files (-r: directories and their contents)"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        let parsed = parse_args(args);
        check_flags("rm", &parsed, "rRf")?;
        let recursive = parsed.has('r') || parsed.has('R');
        let force = parsed.has('f');
        if parsed.operands.is_empty() {
            return if force {
                Ok(String::new())
            } else {
                Err(CommandError::Usage("rm: missing operand".to_string()))
            };
        }
        for target in &parsed.operands {
            let Some(info) = shell.fs().get_node_info(target)? else {
                if force {
                    continue;
                }
                return Err(failed(format!(
                    "rm: cannot remove '{}': No such file or directory",
                    target
                )));
            };
            let removed = if info.is_dir {
                if !recursive {
                    return Err(failed(format!("rm: cannot remove '{}': Is a directory", target)));
                }
                shell.fs().rm_recursive(target)?
            } else {
                shell.fs().rm(target)?
            };
            if !removed {
                return Err(failed(format!("rm: cannot remove '{}'", target)));
            }
        }
        Ok(String::new())
    }
}

/// Remove empty directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmdirCommand;

impl Command for RmdirCommand {
    fn name(&self) -> &'static str {
        "rmdir"
    }

    fn help(&self) -> &'static str {
        "rmdir DIR... - remove empty directories"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        if args.is_empty() {
            return Err(CommandError::Usage("rmdir: missing operand".to_string()));
        }
        for dir in args {
            let reason = match shell.fs().get_node_info(dir)? {
                None => Some("No such file or directory"),
                Some(info) if !info.is_dir => Some("Not a directory"),
                Some(_) if !shell.fs().ls(Some(dir))?.is_empty() => Some("Directory not empty"),
                Some(_) if !shell.fs().rmdir(dir)? => Some("Operation not permitted"),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                return Err(failed(format!("rmdir: failed to remove '{}': {}", dir, reason)));
            }
        }
        Ok(String::new())
    }
}

/// Shared argument handling for `cp` and `mv`: returns the sources and
/// destination after checking that every source exists and that several
/// sources go into a directory.
fn sources_and_target<'a>(
    name: &str,
    shell: &Shell,
    args: &'a [String],
) -> Result<(Vec<&'a str>, &'a str), CommandError> {
    let parsed = parse_args(args);
    check_flags(name, &parsed, "r")?;
    let Some((&target, sources)) = parsed.operands.split_last() else {
        return Err(CommandError::Usage(format!("{}: missing operand", name)));
    };
    if sources.is_empty() {
        return Err(CommandError::Usage(format!(
            "{}: missing destination file operand after '{}'",
            name, target
        )));
    }
    if sources.len() > 1 && !shell.fs().is_dir(target)? {
        return Err(failed(format!("{}: target '{}' is not a directory", name, target)));
    }
    for src in sources {
        if !shell.fs().exists(src)? {
            return Err(failed(format!(
                "{}: cannot stat '{}': No such file or directory",
                name, src
            )));
        }
    }
    Ok((sources.to_vec(), target))
}

/// Copy files and directory trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpCommand;

impl Command for CpCommand {
    fn name(&self) -> &'static str {
        "cp"
    }

    fn help(&self) -> &'static str {
        "cp SOURCE... DEST - copy files and directories"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        let (sources, target) = sources_and_target("cp", shell, args)?;
        let copied = match sources.as_slice() {
            [src] => shell.fs().cp(src, target)?,
            many => shell.fs().cp_many(many, target)?,
        };
        if !copied {
            return Err(failed(format!(
                "cp: cannot copy '{}' to '{}'",
                sources.join("' '"),
                target
            )));
        }
        Ok(String::new())
    }
}

/// Move or rename files and directory trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct MvCommand;

impl Command for MvCommand {
    fn name(&self) -> &'static str {
        "mv"
    }

    fn help(&self) -> &'static str {
        "mv SOURCE... DEST - move or rename files and directories"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        let (sources, target) = sources_and_target("mv", shell, args)?;
        let moved = match sources.as_slice() {
            [src] => shell.fs().mv(src, target)?,
            many => shell.fs().mv_many(many, target)?,
        };
        if !moved {
            return Err(failed(format!(
                "mv: cannot move '{}' to '{}'",
                sources.join("' '"),
                target
            )));
        }
        Ok(String::new())
    }
}

/// Search a directory tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindCommand;

impl Command for FindCommand {
    fn name(&self) -> &'static str {
        "find"
    }

    fn help(&self) -> &'static str {
        "find [PATH] [-name PATTERN] - list paths below PATH, optionally matching a glob"
    }

    fn execute(&self, shell: &mut Shell, args: &[String]) -> Result<String, CommandError> {
        let mut start = None;
        let mut pattern = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-name" => match iter.next() {
                    Some(p) => pattern = Some(p.as_str()),
                    None => {
                        return Err(CommandError::Usage(
                            "find: missing argument to `-name'".to_string(),
                        ));
                    }
                },
                other if other.starts_with('-') => {
                    return Err(CommandError::Usage(format!(
                        "find: unknown predicate `{}'",
                        other
                    )));
                }
                other if start.is_none() => start = Some(other),
                other => {
                    return Err(CommandError::Usage(format!(
                        "find: paths must precede expression: `{}'",
                        other
                    )));
                }
            }
        }

        let start = start.unwrap_or(".");
        if !shell.fs().is_dir(start)? {
            return Err(failed(format!("find: '{}': No such file or directory", start)));
        }
        let found = match pattern {
            Some(pattern) => match shell.fs().search(start, pattern, true) {
                Err(StorageError::InvalidPattern(reason)) => {
                    return Err(CommandError::Usage(format!("find: {}", reason)));
                }
                other => other?,
            },
            None => shell.fs().find(start, true)?,
        };

        let mut lines = found.paths;
        lines.extend(
            found
                .skipped
                .iter()
                .map(|(path, reason)| format!("find: '{}': {}", path, reason)),
        );
        Ok(lines.join("\n"))
    }
}
