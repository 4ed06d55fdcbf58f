//! Helpers for the normalized relative paths used as cache keys.
//!
//! Every path stored in the cache is relative to the source root, uses `/`
//! separators, and has no leading or trailing slash. The empty string means
//! the root itself.

use std::path::Path;

/// Normalize a caller-supplied relative path into cache-key form.
///
/// Backslashes are converted to `/` and leading/trailing separators are
/// stripped, so `"/folder\\sub/"` becomes `"folder/sub"`.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .trim_matches('/')
        .to_string()
}

/// Base name of a path (the last segment). Empty input yields "".
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Path of the containing directory; "" for top-level entries.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Join a parent path and a child name into a normalized relative path.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// True if `path` is `prefix` itself or lives underneath it.
///
/// The comparison is segment-aware: `docs` is a prefix of `docs/readme.md`
/// but not of `docs-archive/readme.md`.
pub fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    if path == prefix {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Ancestor directories of a path, nearest first, root-level last.
///
/// `"a/b/c.txt"` yields `["a/b", "a"]`. The root itself ("") is not
/// included.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while !current.is_empty() {
        out.push(current);
        current = parent(current);
    }
    out
}

/// Relative cache key for an absolute path under `root`.
///
/// Returns `None` when `full` is not inside `root`.
pub fn relative_to(root: &Path, full: &Path) -> Option<String> {
    let rel = full.strip_prefix(root).ok()?;
    let text = rel.to_string_lossy().replace('\\', "/");
    Some(text.trim_matches('/').to_string())
}
