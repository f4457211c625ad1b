//! Depth-first walks for `find` and `search`.

use serde::Serialize;

use crate::path;
use crate::storage::StorageProvider;

/// Outcome of a directory walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Traversal {
    /// Matching absolute paths, in depth-first order
    pub paths: Vec<String>,
    /// Subtrees that could not be read, with the error text
    pub skipped: Vec<(String, String)>,
}

impl Traversal {
    /// Whether every subtree was read.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Walk the children of `start`, recording paths whose basename satisfies
/// `matches`. Backend errors skip the affected subtree.
pub(super) fn walk<F>(
    provider: &dyn StorageProvider,
    start: &str,
    recursive: bool,
    matches: F,
) -> Traversal
where
    F: Fn(&str) -> bool,
{
    let mut out = Traversal::default();
    visit(provider, start, recursive, &matches, &mut out);
    out
}

fn visit<F>(
    provider: &dyn StorageProvider,
    dir: &str,
    recursive: bool,
    matches: &F,
    out: &mut Traversal,
) where
    F: Fn(&str) -> bool,
{
    let children = match provider.list_directory(dir) {
        Ok(children) => children,
        Err(err) => {
            tracing::debug!(path = %dir, error = %err, "skipping unreadable directory");
            out.skipped.push((dir.to_string(), err.to_string()));
            return;
        }
    };
    for name in children {
        let child = path::join(dir, &name);
        if matches(&name) {
            out.paths.push(child.clone());
        }
        if !recursive {
            continue;
        }
        match provider.get_node_info(&child) {
            Ok(Some(info)) if info.is_dir => visit(provider, &child, recursive, matches, out),
            Ok(_) => {}
            Err(err) => out.skipped.push((child, err.to_string())),
        }
    }
}
