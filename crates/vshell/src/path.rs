//! POSIX-style path handling for the virtual filesystem.
//!
//! Every path stored by a provider is absolute and normalized: it starts with
//! `/`, has no empty, `.` or `..` segments, and no trailing slash (except the
//! root itself).

/// Split a path into its non-empty, non-`.` segments, applying `..`.
///
/// `..` at the root is a no-op.
pub fn segments(path: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Normalize a path into its absolute form.
///
/// Relative input is treated as relative to `/`.
pub fn normalize(path: &str) -> String {
    let parts = segments(path);
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Resolve `path` against the directory `cwd`.
///
/// Absolute paths ignore `cwd`. The result is always normalized.
pub fn resolve(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{}/{}", cwd, path))
    }
}

/// Split a normalized path into `(parent, name)`.
///
/// The root splits into `("/", "")`.
pub fn split(path: &str) -> (String, String) {
    let path = normalize(path);
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => ("/".to_string(), path),
    }
}

/// Join a directory path and a single component.
pub fn join(parent: &str, name: &str) -> String {
    if name.is_empty() {
        return normalize(parent);
    }
    if parent.is_empty() || parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Last component of a path, empty for the root.
pub fn basename(path: &str) -> String {
    split(path).1
}

/// Number of components in a path. The root has depth 0.
pub fn depth(path: &str) -> usize {
    segments(path).len()
}

/// Returns true if `path` equals `prefix` or lies beneath it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    let prefix = normalize(prefix);
    if prefix == "/" {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
}
