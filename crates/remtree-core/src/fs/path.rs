//! POSIX path helpers for remote paths.
//!
//! Remote paths are always `/`-separated absolute strings, so these helpers
//! work on `&str` rather than `std::path::Path`.

/// Filesystem root.
pub const ROOT: &str = "/";

/// Collapses repeated separators and strips a trailing `/` (except for root).
pub fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if path.starts_with('/') || parts.is_empty() {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Returns the parent directory, or `None` for the root and bare names.
pub fn parent(path: &str) -> Option<String> {
    let path = normalize(path);
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT.to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Returns the last component of `path`.
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Appends `name` to `dir`.
pub fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Returns `true` if `path` equals `base` or lies anywhere below it.
pub fn is_within(path: &str, base: &str) -> bool {
    let path = normalize(path);
    let base = normalize(base);
    if base == ROOT {
        return path.starts_with('/');
    }
    path == base || path.starts_with(&format!("{base}/"))
}

/// Like [`is_within`] but excludes `base` itself.
pub fn is_strictly_within(path: &str, base: &str) -> bool {
    is_within(path, base) && normalize(path) != normalize(base)
}

/// Every directory from the root down to and including `path`.
///
/// `"/a/b"` yields `["/", "/a", "/a/b"]`.
pub fn ancestors_from_root(path: &str) -> Vec<String> {
    let path = normalize(path);
    let mut chain = vec![ROOT.to_string()];
    let mut current = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        chain.push(current.clone());
    }
    chain
}

/// Every directory from `from` down to and including `to`.
///
/// Returns an empty list when `to` is not within `from`.
pub fn chain_between(from: &str, to: &str) -> Vec<String> {
    if !is_within(to, from) {
        return Vec::new();
    }
    let from = normalize(from);
    ancestors_from_root(to)
        .into_iter()
        .filter(|p| is_within(p, &from))
        .collect()
}
